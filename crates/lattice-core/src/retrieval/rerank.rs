//! Metadata-driven semantic re-ranking
//!
//! Boosts multiply independent bounded factors derived from candidate
//! metadata, weighted by intent: `explain` prefers simple, pure nodes;
//! `refactor` prefers the complex and impure ones that actually need
//! work; `debug` leans toward impure, branching code.

use super::SearchIntent;
use crate::model::NodeAttrs;

/// Each factor stays inside [0.85, 1.2]; the product is clamped so a
/// boost can reorder neighbors but never bury a strong fusion score.
const BOOST_FLOOR: f32 = 0.6;
const BOOST_CEIL: f32 = 1.7;

pub fn boost_for(attrs: &NodeAttrs, intent: SearchIntent) -> f32 {
    let boost = purity_factor(attrs, intent)
        * complexity_factor(attrs, intent)
        * origin_factor(attrs);
    boost.clamp(BOOST_FLOOR, BOOST_CEIL)
}

fn purity_factor(attrs: &NodeAttrs, intent: SearchIntent) -> f32 {
    match (attrs.extra.get("purity").map(String::as_str), intent) {
        (Some("pure"), SearchIntent::Explain) => 1.15,
        (Some("pure"), SearchIntent::Refactor) => 0.9,
        (Some("impure"), SearchIntent::Refactor) => 1.15,
        (Some("impure"), SearchIntent::Debug) => 1.1,
        (Some("impure"), SearchIntent::Explain) => 0.9,
        _ => 1.0,
    }
}

fn complexity_factor(attrs: &NodeAttrs, intent: SearchIntent) -> f32 {
    let complexity = attrs
        .extra
        .get("complexity")
        .and_then(|c| c.parse::<f32>().ok())
        .or_else(|| attrs.span.map(|(start, end)| end.saturating_sub(start) as f32));
    let Some(complexity) = complexity else {
        return 1.0;
    };
    let simple = complexity <= 20.0;
    let complex = complexity >= 60.0;
    match intent {
        SearchIntent::Explain if simple => 1.1,
        SearchIntent::Explain if complex => 0.9,
        SearchIntent::Refactor if complex => 1.2,
        SearchIntent::Refactor if simple => 0.9,
        SearchIntent::Debug if complex => 1.05,
        _ => 1.0,
    }
}

fn origin_factor(attrs: &NodeAttrs) -> f32 {
    match attrs.extra.get("origin").map(String::as_str) {
        Some("core") => 1.1,
        Some("native") | Some("vendored") => 0.85,
        _ => 1.0,
    }
}
