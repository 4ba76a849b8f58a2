//! Layered configuration resolution
//!
//! This crate turns an ordered list of configuration sources (files, URLs,
//! inline YAML) into an ordered list of [`Leaf`] records.
//!
//! # Architecture
//!
//! - [`ConfigSource`]: where a piece of configuration comes from
//! - [`Fetcher`]: reads file and URL sources as text
//! - [`Templater`]: renders fetched text against values resolved so far
//! - [`Resolver`]: walks sources depth-first, following the stem key
//! - [`Leaf`]: per-aspect deep-merge of everything on the path to a node
//!
//! # Example
//!
//! ```ignore
//! use frkl::{HttpFetcher, Resolver, ResolverConfig};
//!
//! let resolver = Resolver::new(ResolverConfig::default(), HttpFetcher::new())?;
//! let sources = resolver.sources(&["gh:makkus/dotfiles/freckles.yml"])?;
//! for leaf in resolver.resolve(&sources)? {
//!     println!("{}", leaf.to_value());
//! }
//! ```

pub mod error;
pub mod fetch;
pub mod leaf;
pub mod merge;
pub mod resolver;
pub mod source;
pub mod template;

pub use error::{Error, ErrorCategory, Result};
pub use fetch::{Fetcher, HttpFetcher, LocalFetcher};
pub use leaf::{AspectLayer, Leaf};
pub use merge::{deep_merge, merge_all, merge_maps};
pub use resolver::{Resolver, ResolverConfig};
pub use source::{Abbreviations, ConfigSource, Segment};
pub use template::Templater;
