//! DOM capability interface
//!
//! The poll logic never talks to the browser driver directly: it sees the
//! page through [`DomQuery`] and interacts with elements through
//! [`DomHandle`]. The live implementation ([`PageDom`]) adapts a
//! [`BrowserSession`]; tests substitute in-memory fakes.

use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::Element;
use tracing::debug;

use super::{BrowserError, BrowserSession};

/// An ordered view of the page DOM.
#[async_trait]
pub trait DomQuery: Send + Sync {
    type Handle: DomHandle;

    /// All elements whose own text contains `needle`.
    async fn find_by_text_contains(&self, needle: &str)
        -> Result<Vec<Self::Handle>, BrowserError>;

    /// All elements matching a CSS selector.
    async fn find_by_selector(&self, selector: &str) -> Result<Vec<Self::Handle>, BrowserError>;

    /// All elements with the given tag name.
    async fn find_by_tag(&self, tag: &str) -> Result<Vec<Self::Handle>, BrowserError>;
}

/// A handle to one element on the page.
#[async_trait]
pub trait DomHandle: Send + Sync {
    async fn text(&self) -> Result<String, BrowserError>;
    async fn attribute(&self, name: &str) -> Result<Option<String>, BrowserError>;
    async fn type_text(&self, text: &str) -> Result<(), BrowserError>;
    async fn click(&self) -> Result<(), BrowserError>;
}

/// Marker attribute used to surface text-search hits as selectable elements.
const TEXT_HIT_ATTR: &str = "data-wcb-text-hit";

/// Live DOM capability backed by the session's page.
pub struct PageDom {
    session: Arc<BrowserSession>,
}

impl PageDom {
    pub fn new(session: Arc<BrowserSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl DomQuery for PageDom {
    type Handle = PageHandle;

    async fn find_by_text_contains(
        &self,
        needle: &str,
    ) -> Result<Vec<PageHandle>, BrowserError> {
        // CSS cannot express a text-contains query, so tag matching leaf
        // elements with a marker attribute and select the marker.
        let needle_json = serde_json::Value::String(needle.to_string()).to_string();
        let script = format!(
            r#"
            (function() {{
                const needle = {needle_json};
                for (const el of document.querySelectorAll('[{attr}]')) {{
                    el.removeAttribute('{attr}');
                }}
                let hits = 0;
                for (const el of document.querySelectorAll('body *')) {{
                    if (el.childElementCount === 0 && (el.textContent || '').includes(needle)) {{
                        el.setAttribute('{attr}', '1');
                        hits++;
                    }}
                }}
                return hits;
            }})()
            "#,
            attr = TEXT_HIT_ATTR,
        );

        let hits = self.session.execute_js(&script).await?;
        debug!("Text search for {needle_json} matched {hits} element(s)");

        if hits.as_u64() == Some(0) {
            return Ok(Vec::new());
        }
        self.find_by_selector(&format!("[{TEXT_HIT_ATTR}]")).await
    }

    async fn find_by_selector(&self, selector: &str) -> Result<Vec<PageHandle>, BrowserError> {
        Ok(self
            .session
            .find_elements(selector)
            .await?
            .into_iter()
            .map(PageHandle::new)
            .collect())
    }

    async fn find_by_tag(&self, tag: &str) -> Result<Vec<PageHandle>, BrowserError> {
        // A bare tag name is a valid CSS selector.
        self.find_by_selector(tag).await
    }
}

/// Live element handle wrapping a CDP element.
pub struct PageHandle {
    element: Element,
}

impl PageHandle {
    fn new(element: Element) -> Self {
        Self { element }
    }
}

#[async_trait]
impl DomHandle for PageHandle {
    async fn text(&self) -> Result<String, BrowserError> {
        Ok(self
            .element
            .inner_text()
            .await
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?
            .unwrap_or_default())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, BrowserError> {
        self.element
            .attribute(name)
            .await
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))
    }

    async fn type_text(&self, text: &str) -> Result<(), BrowserError> {
        // Focus via click first, as a user would.
        self.element
            .click()
            .await
            .map_err(|e| BrowserError::ElementNotFound(e.to_string()))?;
        self.element
            .type_str(text)
            .await
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;
        Ok(())
    }

    async fn click(&self) -> Result<(), BrowserError> {
        self.element
            .click()
            .await
            .map_err(|e| BrowserError::ElementNotFound(e.to_string()))?;
        Ok(())
    }
}

/// In-memory DOM fakes shared by the crate's tests.
#[cfg(test)]
pub(crate) mod fake {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::{DomHandle, DomQuery};
    use crate::browser::BrowserError;

    /// One scripted element.
    #[derive(Clone)]
    pub struct FakeNode {
        pub tag: &'static str,
        pub text: String,
        pub attrs: HashMap<String, String>,
        /// Whether the answer-choice CSS selector matches this node.
        pub matches_answer_selector: bool,
        pub clicks: Arc<AtomicUsize>,
        pub typed: Arc<Mutex<Vec<String>>>,
        pub fail_click: bool,
    }

    impl FakeNode {
        fn new(tag: &'static str, text: &str) -> Self {
            Self {
                tag,
                text: text.to_string(),
                attrs: HashMap::new(),
                matches_answer_selector: false,
                clicks: Arc::new(AtomicUsize::new(0)),
                typed: Arc::new(Mutex::new(Vec::new())),
                fail_click: false,
            }
        }

        pub fn button(text: &str) -> Self {
            Self::new("button", text)
        }

        /// A button the answer-choice selector matches.
        pub fn answer(text: &str) -> Self {
            let mut node = Self::new("button", text);
            node.matches_answer_selector = true;
            node
        }

        pub fn text_node(text: &str) -> Self {
            Self::new("div", text)
        }

        pub fn input(input_type: &str, placeholder: &str) -> Self {
            Self::new("input", "")
                .with_attr("type", input_type)
                .with_attr("placeholder", placeholder)
        }

        pub fn with_attr(mut self, name: &str, value: &str) -> Self {
            self.attrs.insert(name.to_string(), value.to_string());
            self
        }

        pub fn failing_click(mut self) -> Self {
            self.fail_click = true;
            self
        }

        pub fn click_count(&self) -> usize {
            self.clicks.load(Ordering::Relaxed)
        }

        pub fn typed_text(&self) -> Vec<String> {
            self.typed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DomHandle for FakeNode {
        async fn text(&self) -> Result<String, BrowserError> {
            Ok(self.text.clone())
        }

        async fn attribute(&self, name: &str) -> Result<Option<String>, BrowserError> {
            Ok(self.attrs.get(name).cloned())
        }

        async fn type_text(&self, text: &str) -> Result<(), BrowserError> {
            self.typed.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn click(&self) -> Result<(), BrowserError> {
            if self.fail_click {
                return Err(BrowserError::ElementNotFound("element is stale".into()));
            }
            self.clicks.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeDomState {
        nodes: Vec<FakeNode>,
        fail_queries: bool,
        panic_on_query: bool,
    }

    /// Scriptable DOM snapshot. Clones share state, so tests can mutate the
    /// page between watcher ticks.
    #[derive(Clone, Default)]
    pub struct FakeDom {
        state: Arc<Mutex<FakeDomState>>,
        queries: Arc<AtomicUsize>,
    }

    impl FakeDom {
        pub fn new(nodes: Vec<FakeNode>) -> Self {
            let dom = Self::default();
            dom.set_nodes(nodes);
            dom
        }

        pub fn set_nodes(&self, nodes: Vec<FakeNode>) {
            self.state.lock().unwrap().nodes = nodes;
        }

        pub fn fail_queries(&self, fail: bool) {
            self.state.lock().unwrap().fail_queries = fail;
        }

        pub fn panic_on_query(&self) {
            self.state.lock().unwrap().panic_on_query = true;
        }

        pub fn query_count(&self) -> usize {
            self.queries.load(Ordering::Relaxed)
        }

        fn filtered(
            &self,
            keep: impl Fn(&FakeNode) -> bool,
        ) -> Result<Vec<FakeNode>, BrowserError> {
            self.queries.fetch_add(1, Ordering::Relaxed);
            let state = self.state.lock().unwrap();
            if state.panic_on_query {
                panic!("scripted dom panic");
            }
            if state.fail_queries {
                return Err(BrowserError::JavaScriptError("dom query failed".into()));
            }
            Ok(state.nodes.iter().filter(|n| keep(n)).cloned().collect())
        }
    }

    #[async_trait]
    impl DomQuery for FakeDom {
        type Handle = FakeNode;

        async fn find_by_text_contains(
            &self,
            needle: &str,
        ) -> Result<Vec<FakeNode>, BrowserError> {
            self.filtered(|n| n.text.contains(needle))
        }

        async fn find_by_selector(&self, _selector: &str) -> Result<Vec<FakeNode>, BrowserError> {
            self.filtered(|n| n.matches_answer_selector)
        }

        async fn find_by_tag(&self, tag: &str) -> Result<Vec<FakeNode>, BrowserError> {
            let tag = tag.to_string();
            self.filtered(|n| n.tag == tag)
        }
    }
}
