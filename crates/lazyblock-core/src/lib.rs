#![forbid(unsafe_code)]

//! Publish-time pipeline for deferred ("click to load") embeds.
//!
//! A block's author HTML is scanned, reduced to an allowlist, hardened, base64-encoded and
//! wrapped in inert container markup. Nothing in the author HTML executes until a reader
//! activates the block (see the `lazyblock-activate` crate).
//!
//! ```
//! use lazyblock_core::{Author, BlockConfiguration, render_block};
//!
//! let cfg = BlockConfiguration::with_html(r#"<iframe src="https://example.com/v"></iframe>"#);
//! let out = render_block(&cfg, &Author::contributor()).unwrap();
//! assert!(out.markup().contains(r#"data-loaded="false""#));
//! ```

pub mod config;
pub mod css;
pub mod error;
pub mod payload;
pub mod privilege;
pub mod render;
pub mod sanitize;
pub mod scan;
pub mod url;

pub use config::{BlockConfiguration, Settings, TriggerKind};
pub use error::{Error, Result};
pub use payload::PayloadError;
pub use privilege::{Author, Capabilities, Role};
pub use render::{
    BlockReason, EncodedInstance, IdSource, IframeConfig, Rendered, Renderer, render_block,
};
pub use sanitize::{AllowList, ContentSanitizer, SanitizedPayload, sanitize};
pub use scan::{Check, ScanReport, Verdict, scan};
