//! Processing scopes: the typed context chain a record is transformed in
//!
//! A scope is one [`Context`] plus a borrowed parent. Pushing creates a child
//! on the stack; the parent is never modified and is usable again once the
//! child is dropped. Lookups walk outward from the innermost layer and select
//! a variant by type through [`ScopeItem`].

use crate::types::{Page, PageEvent, Visit};
use std::sync::Arc;

/// Reference to one page of a page list
#[derive(Debug, Clone)]
pub struct PageRef {
    pages: Arc<[Page]>,
    index: usize,
}

impl PageRef {
    /// `None` when `index` is out of range
    pub fn new(pages: Arc<[Page]>, index: usize) -> Option<Self> {
        (index < pages.len()).then_some(PageRef { pages, index })
    }

    pub fn page(&self) -> &Page {
        &self.pages[self.index]
    }

    /// Position of the page within its visit (or view)
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Reference to one event of a page
#[derive(Debug, Clone)]
pub struct EventRef {
    page: PageRef,
    index: usize,
}

impl EventRef {
    pub fn new(page: PageRef, index: usize) -> Option<Self> {
        (index < page.page().events.len()).then_some(EventRef { page, index })
    }

    pub fn event(&self) -> &PageEvent {
        &self.page.page().events[self.index]
    }

    pub fn page(&self) -> &PageRef {
        &self.page
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// Which branch of a splitter produced the current scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitInfo {
    pub name: String,
    pub index: usize,
}

/// Funnel step result for the current record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunnelOutcome {
    Continued,
    Fallout,
}

impl FunnelOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            FunnelOutcome::Continued => "Continued",
            FunnelOutcome::Fallout => "Fallout",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunnelStep {
    pub index: usize,
    pub name: String,
    pub outcome: FunnelOutcome,
}

/// One layer of a scope
#[derive(Debug, Clone)]
pub enum Context {
    Visit(Visit),
    Page(PageRef),
    PageEvent(EventRef),
    Split(SplitInfo),
    Funnel(FunnelStep),
}

/// A type that can be looked up in a scope chain
pub trait ScopeItem {
    fn from_context(context: &Context) -> Option<&Self>;
}

impl ScopeItem for Visit {
    fn from_context(context: &Context) -> Option<&Self> {
        match context {
            Context::Visit(v) => Some(v),
            _ => None,
        }
    }
}

impl ScopeItem for PageRef {
    fn from_context(context: &Context) -> Option<&Self> {
        match context {
            Context::Page(p) => Some(p),
            _ => None,
        }
    }
}

impl ScopeItem for EventRef {
    fn from_context(context: &Context) -> Option<&Self> {
        match context {
            Context::PageEvent(e) => Some(e),
            _ => None,
        }
    }
}

impl ScopeItem for SplitInfo {
    fn from_context(context: &Context) -> Option<&Self> {
        match context {
            Context::Split(s) => Some(s),
            _ => None,
        }
    }
}

impl ScopeItem for FunnelStep {
    fn from_context(context: &Context) -> Option<&Self> {
        match context {
            Context::Funnel(f) => Some(f),
            _ => None,
        }
    }
}

/// A context layer and the chain of scopes enclosing it
#[derive(Debug)]
pub struct ProcessingScope<'p> {
    context: Context,
    parent: Option<&'p ProcessingScope<'p>>,
}

impl ProcessingScope<'static> {
    pub fn root(context: Context) -> Self {
        ProcessingScope {
            context,
            parent: None,
        }
    }
}

impl<'p> ProcessingScope<'p> {
    /// Child scope with `context` as its innermost layer
    pub fn push(&self, context: Context) -> ProcessingScope<'_> {
        ProcessingScope {
            context,
            parent: Some(self),
        }
    }

    /// Nearest enclosing item of type `T`
    pub fn current<T: ScopeItem>(&self) -> Option<&T> {
        let mut scope: Option<&ProcessingScope<'_>> = Some(self);
        while let Some(s) = scope {
            if let Some(item) = T::from_context(&s.context) {
                return Some(item);
            }
            scope = s.parent;
        }
        None
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn parent(&self) -> Option<&ProcessingScope<'_>> {
        self.parent
    }

    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut scope = self.parent;
        while let Some(s) = scope {
            depth += 1;
            scope = s.parent;
        }
        depth
    }

    /// Push `contexts` in order and run `f` in the innermost scope
    pub fn enter<R>(
        &self,
        contexts: Vec<Context>,
        f: &mut dyn FnMut(&ProcessingScope<'_>) -> R,
    ) -> R {
        fn descend<R>(
            scope: &ProcessingScope<'_>,
            mut rest: std::vec::IntoIter<Context>,
            f: &mut dyn FnMut(&ProcessingScope<'_>) -> R,
        ) -> R {
            match rest.next() {
                None => f(scope),
                Some(context) => {
                    let child = scope.push(context);
                    descend(&child, rest, f)
                }
            }
        }

        descend(self, contexts.into_iter(), f)
    }
}
