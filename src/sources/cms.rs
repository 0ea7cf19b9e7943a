//! CMS fingerprinting from the shared homepage.

use async_trait::async_trait;

use super::{EnrichmentContext, EnrichmentSource, HomePage, Signal};
use crate::errors::Result;

pub struct CmsSource;

impl CmsSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CmsSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EnrichmentSource for CmsSource {
    fn name(&self) -> &'static str {
        "cms"
    }

    async fn collect(&self, ctx: &mut EnrichmentContext) -> Result<Vec<Signal>> {
        if !ctx.opts.enable_homepage {
            return Ok(vec![]);
        }
        let page = ctx.homepage().await?;
        Ok(detect_cms(&page).map(Signal::Cms).into_iter().collect())
    }
}

/// `X-Powered-By` header first, body markers second.
pub(crate) fn detect_cms(page: &HomePage) -> Option<String> {
    if let Some(powered_by) = &page.powered_by {
        let powered_by = powered_by.to_lowercase();
        if powered_by.contains("wordpress") {
            return Some("WordPress".to_string());
        }
        if powered_by.contains("drupal") {
            return Some("Drupal".to_string());
        }
    }

    let body = &page.body;
    if body.contains("wp-content") || body.contains("wp-includes") {
        return Some("WordPress".to_string());
    }
    if body.contains("drupal") {
        return Some("Drupal".to_string());
    }
    if body.contains("joomla") {
        return Some("Joomla".to_string());
    }
    None
}
