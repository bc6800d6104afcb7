#![forbid(unsafe_code)]

//! `lazyblock` defers third-party embeds until a reader asks for them.
//!
//! At publish time a block's HTML is scanned, reduced to an allowlist and stored base64-encoded
//! inside inert container markup. At activation time the payload is decoded, checked again and
//! injected into the page exactly once.
//!
//! # Features
//!
//! - `activate`: enable the activation pipeline (`lazyblock::activate`)

pub use lazyblock_core::*;

#[cfg(feature = "activate")]
pub mod activate {
    pub use lazyblock_activate::{
        ActivationController, ActivationError, ActivationState, ClientSanitizer,
        ControllerOptions, Dispatch, DomHost, EventBus, HeadlessHost, INJECT_DELAY_MS,
        InstanceNode, Key, LifecycleEvent, PRELOAD_MARGIN_PX, Page, SanitizerKind, Script,
        TriggerEvent, ViewportGeometry,
    };

    pub type Result<T> = std::result::Result<T, ActivationError>;

    /// Renders one block and reads the resulting markup back as a page, ready for activation.
    ///
    /// Blocked and empty blocks yield a page with no instances.
    pub fn page_for_block(
        renderer: &mut crate::Renderer,
        block: &crate::BlockConfiguration,
        author: &dyn crate::Capabilities,
    ) -> std::result::Result<Page, PageError> {
        let rendered = renderer.render(block, author)?;
        Ok(Page::from_markup(rendered.markup())?)
    }

    #[derive(Debug, thiserror::Error)]
    pub enum PageError {
        #[error(transparent)]
        Render(#[from] crate::Error),
        #[error(transparent)]
        Activation(#[from] ActivationError),
    }

    /// Controller over a [`HeadlessHost`] with options taken from site settings.
    pub fn headless_controller(
        markup: &str,
        settings: &crate::Settings,
    ) -> Result<ActivationController<HeadlessHost>> {
        Ok(
            ActivationController::from_markup(markup, HeadlessHost::default())?
                .with_options(ControllerOptions::from_settings(settings)),
        )
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::{Author, BlockConfiguration, Renderer};

        #[test]
        fn rendered_block_activates_through_the_facade() {
            let mut renderer = Renderer::default();
            let block = BlockConfiguration::with_html(r#"<iframe src="https://e.com/v"></iframe>"#);
            let page = page_for_block(&mut renderer, &block, &Author::contributor()).unwrap();
            assert_eq!(page.pending_ids(), vec!["llb-1"]);

            let mut renderer = Renderer::default();
            let markup = renderer
                .render(&block, &Author::contributor())
                .unwrap()
                .markup()
                .to_string();
            let mut controller =
                headless_controller(&markup, &crate::Settings::default()).unwrap();
            assert_eq!(controller.load("llb-1"), Dispatch::Started);
            assert_eq!(controller.run_until_idle(), 1);
            assert_eq!(controller.state("llb-1"), Some(ActivationState::Loaded));
        }

        #[test]
        fn blocked_block_yields_an_empty_page() {
            let mut renderer = Renderer::default();
            let block = BlockConfiguration::with_html("<script>alert(1)</script>");
            let page = page_for_block(&mut renderer, &block, &Author::contributor()).unwrap();
            assert!(page.is_empty());
        }
    }
}
