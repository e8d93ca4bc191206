//! PyPI RSS feed parsing

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{PypiError, Result};
use crate::pypi::types::FeedItem;

#[derive(Default)]
struct PartialItem {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    pub_date: Option<String>,
}

impl PartialItem {
    fn field(&mut self, element: &[u8]) -> Option<&mut Option<String>> {
        match element {
            b"title" => Some(&mut self.title),
            b"link" => Some(&mut self.link),
            b"description" => Some(&mut self.description),
            b"pubDate" => Some(&mut self.pub_date),
            _ => None,
        }
    }

    /// Items missing any of the four fields are dropped
    fn finish(self) -> Option<FeedItem> {
        Some(FeedItem {
            title: self.title?,
            link: self.link?,
            description: self.description?,
            published_date: self.pub_date?,
        })
    }
}

/// Parse the `<item>` elements of an RSS document
pub fn parse_feed(xml: &str, url: &str) -> Result<Vec<FeedItem>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let bad_xml = |e: quick_xml::Error| PypiError::BadResponse {
        url: url.to_string(),
        message: format!("Invalid XML response: {}", e),
    };

    let mut items = Vec::new();
    let mut current: Option<PartialItem> = None;
    let mut element: Option<Vec<u8>> = None;

    loop {
        match reader.read_event().map_err(bad_xml)? {
            Event::Start(e) => {
                let name = e.local_name().as_ref().to_vec();
                if name == b"item" {
                    current = Some(PartialItem::default());
                } else if let Some(item) = current.as_mut() {
                    if let Some(slot) = item.field(&name) {
                        slot.get_or_insert_with(String::new);
                    }
                    element = Some(name);
                }
            }
            Event::Empty(e) => {
                if let Some(item) = current.as_mut() {
                    if let Some(slot) = item.field(e.local_name().as_ref()) {
                        slot.get_or_insert_with(String::new);
                    }
                }
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(bad_xml)?;
                append(&mut current, element.as_deref(), &text);
            }
            Event::CData(e) => {
                let raw = e.into_inner();
                append(&mut current, element.as_deref(), &String::from_utf8_lossy(&raw));
            }
            Event::End(e) => {
                if e.local_name().as_ref() == b"item" {
                    if let Some(item) = current.take().and_then(PartialItem::finish) {
                        items.push(item);
                    }
                }
                element = None;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if current.is_some() {
        return Err(PypiError::BadResponse {
            url: url.to_string(),
            message: "Invalid XML response: unterminated <item>".to_string(),
        }
        .into());
    }

    Ok(items)
}

fn append(current: &mut Option<PartialItem>, element: Option<&[u8]>, text: &str) {
    let (Some(item), Some(element)) = (current.as_mut(), element) else {
        return;
    };
    if let Some(slot) = item.field(element) {
        slot.get_or_insert_with(String::new).push_str(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>PyPI newest packages</title>
    <item>
      <title>demo-pkg added to PyPI</title>
      <link>https://pypi.org/project/demo-pkg/</link>
      <description>A demo &amp; nothing more</description>
      <pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate>
    </item>
    <item>
      <title>no-date added to PyPI</title>
      <link>https://pypi.org/project/no-date/</link>
      <description>Missing pubDate</description>
    </item>
    <item>
      <title>empty-desc 0.1</title>
      <link>https://pypi.org/project/empty-desc/0.1/</link>
      <description/>
      <pubDate>Tue, 02 Jan 2024 00:00:00 GMT</pubDate>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_feed_items() {
        let items = parse_feed(FEED, "https://pypi.org/rss/packages.xml").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "demo-pkg added to PyPI");
        assert_eq!(items[0].description, "A demo & nothing more");
        assert_eq!(items[0].published_date, "Mon, 01 Jan 2024 00:00:00 GMT");
        assert_eq!(items[1].description, "");
    }

    #[test]
    fn test_channel_title_is_ignored() {
        let items = parse_feed(FEED, "feed").unwrap();
        assert!(items.iter().all(|i| i.title != "PyPI newest packages"));
    }

    #[test]
    fn test_invalid_xml() {
        let err = parse_feed("<rss><item><title>x</link></item></rss>", "feed").unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::ParseError);
    }

    #[test]
    fn test_cdata_description() {
        let xml = "<rss><channel><item><title>t</title><link>l</link>\
                   <description><![CDATA[<b>bold</b>]]></description>\
                   <pubDate>d</pubDate></item></channel></rss>";
        let items = parse_feed(xml, "feed").unwrap();
        assert_eq!(items[0].description, "<b>bold</b>");
    }
}
