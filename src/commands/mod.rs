pub mod apply;
pub mod debug;
pub mod print_config;

use crate::config::FrecklesConfig;
use anyhow::Result;
use frkl::{HttpFetcher, Leaf, Resolver};

/// Resolve user-given sources into leaves.
pub fn resolve(config: &FrecklesConfig, raw: &[String]) -> Result<Vec<Leaf>> {
    let resolver = Resolver::new(config.resolver.resolver_config(), HttpFetcher::new())?;
    let sources = resolver.sources(raw)?;
    let leaves = resolver.resolve(&sources)?;
    log::info!("Resolved {} source(s) into {} leaves", sources.len(), leaves.len());
    Ok(leaves)
}
