//! Payment-processor detection from the shared homepage.

use async_trait::async_trait;

use super::{EnrichmentContext, EnrichmentSource, HomePage, Signal};
use crate::errors::Result;

/// Processor name -> body substrings that betray its checkout integration.
const PAYMENT_INDICATORS: &[(&str, &[&str])] = &[
    ("stripe", &["stripe.com", "js.stripe.com", "checkout.stripe.com"]),
    ("paypal", &["paypal.com", "paypalobjects.com"]),
    ("square", &["square.com", "squareup.com"]),
    ("braintree", &["braintreegateway.com"]),
    ("coinbase", &["coinbase.com", "commerce.coinbase.com"]),
    ("bitpay", &["bitpay.com"]),
    ("crypto", &["crypto.com", "binance.com", "bitcoin.org"]),
];

/// Generic checkout markup that signals some processor without naming one.
const GENERIC_BUTTON_MARKERS: &[&str] = &[
    "paypal-button",
    "stripe-button",
    "checkout-button",
    "payment-button",
];

pub struct PaymentSource;

impl PaymentSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PaymentSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EnrichmentSource for PaymentSource {
    fn name(&self) -> &'static str {
        "payment"
    }

    async fn collect(&self, ctx: &mut EnrichmentContext) -> Result<Vec<Signal>> {
        if !ctx.opts.enable_homepage {
            return Ok(vec![]);
        }
        let page = ctx.homepage().await?;
        let processors = detect_payment_processors(&page);
        if processors.is_empty() {
            Ok(vec![])
        } else {
            Ok(vec![Signal::PaymentProcessors(processors)])
        }
    }
}

/// Ordered set of detected processors; `unknown` is appended when only
/// generic checkout markup is present.
pub(crate) fn detect_payment_processors(page: &HomePage) -> Vec<String> {
    let body = &page.body;
    let mut processors: Vec<String> = Vec::new();

    for (processor, indicators) in PAYMENT_INDICATORS {
        if indicators.iter().any(|i| body.contains(i)) {
            let processor = (*processor).to_string();
            if !processors.contains(&processor) {
                processors.push(processor);
            }
        }
    }

    if GENERIC_BUTTON_MARKERS.iter().any(|m| body.contains(m)) {
        processors.push("unknown".to_string());
    }

    processors
}
