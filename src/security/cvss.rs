//! CVSS v3.x base score calculation

use std::collections::HashMap;

/// Score a severity entry: a plain number or a `CVSS:3.x/...` vector.
/// Other vector versions are not scored.
pub fn score(value: &str) -> Option<f64> {
    let value = value.trim();
    if let Ok(number) = value.parse::<f64>() {
        return (0.0..=10.0).contains(&number).then_some(number);
    }
    base_score(value)
}

/// CVSS v3.0/v3.1 base score of a vector string
pub fn base_score(vector: &str) -> Option<f64> {
    let mut parts = vector.trim().split('/');
    match parts.next()? {
        "CVSS:3.0" | "CVSS:3.1" => {}
        _ => return None,
    }

    let metrics: HashMap<&str, &str> = parts.filter_map(|p| p.split_once(':')).collect();
    let metric = |name: &str| metrics.get(name).copied();

    let scope_changed = match metric("S")? {
        "U" => false,
        "C" => true,
        _ => return None,
    };

    let attack_vector = match metric("AV")? {
        "N" => 0.85,
        "A" => 0.62,
        "L" => 0.55,
        "P" => 0.2,
        _ => return None,
    };
    let attack_complexity = match metric("AC")? {
        "L" => 0.77,
        "H" => 0.44,
        _ => return None,
    };
    let privileges_required = match (metric("PR")?, scope_changed) {
        ("N", _) => 0.85,
        ("L", false) => 0.62,
        ("L", true) => 0.68,
        ("H", false) => 0.27,
        ("H", true) => 0.5,
        _ => return None,
    };
    let user_interaction = match metric("UI")? {
        "N" => 0.85,
        "R" => 0.62,
        _ => return None,
    };
    let impact_weight = |name: &str| match metric(name)? {
        "H" => Some(0.56),
        "L" => Some(0.22),
        "N" => Some(0.0),
        _ => None,
    };
    let confidentiality = impact_weight("C")?;
    let integrity = impact_weight("I")?;
    let availability = impact_weight("A")?;

    let iss = 1.0 - (1.0 - confidentiality) * (1.0 - integrity) * (1.0 - availability);
    let impact = if scope_changed {
        7.52 * (iss - 0.029) - 3.25 * (iss - 0.02f64).powi(15)
    } else {
        6.42 * iss
    };
    let exploitability =
        8.22 * attack_vector * attack_complexity * privileges_required * user_interaction;

    if impact <= 0.0 {
        return Some(0.0);
    }

    let score = if scope_changed {
        round_up((1.08 * (impact + exploitability)).min(10.0))
    } else {
        round_up((impact + exploitability).min(10.0))
    };
    Some(score)
}

/// Round up to one decimal, tolerant of floating point noise
fn round_up(value: f64) -> f64 {
    let scaled = (value * 100_000.0).round() as i64;
    if scaled % 10_000 == 0 {
        scaled as f64 / 100_000.0
    } else {
        ((scaled / 10_000) + 1) as f64 / 10.0
    }
}
