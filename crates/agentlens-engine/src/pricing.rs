//! Model pricing lookup.
//!
//! Rates are USD per million tokens. Matching is literal prefix over an
//! ordered table, so dated model ids (`claude-opus-4-6-20260115`) resolve
//! without the table having to know every release; keep more specific
//! prefixes ahead of less specific ones.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
    pub cache_write_per_mtok: f64,
    pub cache_read_per_mtok: f64,
}

const fn rates(
    input_per_mtok: f64,
    output_per_mtok: f64,
    cache_write_per_mtok: f64,
    cache_read_per_mtok: f64,
) -> ModelPricing {
    ModelPricing {
        input_per_mtok,
        output_per_mtok,
        cache_write_per_mtok,
        cache_read_per_mtok,
    }
}

const PRICING_RULES: &[(&str, ModelPricing)] = &[
    ("claude-opus-4", rates(15.0, 75.0, 18.75, 1.50)),
    ("claude-sonnet-4", rates(3.0, 15.0, 3.75, 0.30)),
    ("claude-haiku-4-5", rates(1.0, 5.0, 1.25, 0.10)),
    ("claude-3-7-sonnet", rates(3.0, 15.0, 3.75, 0.30)),
    ("claude-3-5-sonnet", rates(3.0, 15.0, 3.75, 0.30)),
    ("claude-3-5-haiku", rates(0.80, 4.0, 1.0, 0.08)),
    ("claude-3-opus", rates(15.0, 75.0, 18.75, 1.50)),
    ("claude-3-haiku", rates(0.25, 1.25, 0.30, 0.03)),
];

/// First rule whose prefix matches the model id, or `None` for unknown models.
pub fn lookup_pricing(model: &str) -> Option<&'static ModelPricing> {
    PRICING_RULES
        .iter()
        .find(|(prefix, _)| model.starts_with(prefix))
        .map(|(_, pricing)| pricing)
}

/// Cost in USD for one response's token counts. Unknown models cost zero.
pub fn compute_cost(
    input_tokens: u64,
    output_tokens: u64,
    cache_creation_tokens: u64,
    cache_read_tokens: u64,
    model: &str,
) -> f64 {
    let Some(pricing) = lookup_pricing(model) else {
        return 0.0;
    };

    const MTOK: f64 = 1_000_000.0;
    input_tokens as f64 / MTOK * pricing.input_per_mtok
        + output_tokens as f64 / MTOK * pricing.output_per_mtok
        + cache_creation_tokens as f64 / MTOK * pricing.cache_write_per_mtok
        + cache_read_tokens as f64 / MTOK * pricing.cache_read_per_mtok
}
