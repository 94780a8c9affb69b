//! Filter set: named predicates composed into visibility and interactivity

use std::fmt;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::application::{ApplicationError, ApplicationResult};
use crate::config::FilterSettings;
use crate::domain::{ItemId, ItemKind, ObjectHandle, TreeItem};
use crate::infrastructure::traits::{DomainAdapter, SelectionProvider};

pub const ONLY_SELECTED: &str = "only_selected";
pub const HIDE_TEMPORARY: &str = "hide_temporary";
pub const HIDE_COMPONENTS: &str = "hide_components";
pub const HIDE_NESTED_SCOPES: &str = "hide_nested_scopes";
pub const HIDE_UNLOADED: &str = "hide_unloaded";
pub const NESTED_SCOPE_INTERACTION: &str = "nested_scope_interaction";
pub const LOCKED_INTERACTION: &str = "locked_interaction";

/// What the filters may look at while evaluating an item.
#[derive(Clone, Copy)]
pub struct FilterContext<'a> {
    pub domain: &'a dyn DomainAdapter,
    pub selection: &'a dyn SelectionProvider,
}

pub type FilterPredicate = Arc<dyn Fn(&TreeItem, &FilterContext<'_>) -> bool + Send + Sync>;

/// Outcome for items whose kind the filter does not inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDefault {
    Pass,
    Fail,
}

pub struct Filter {
    name: String,
    kinds: Vec<ItemKind>,
    default: FilterDefault,
    predicate: FilterPredicate,
    interactive: Option<FilterPredicate>,
    active: bool,
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("name", &self.name)
            .field("kinds", &self.kinds)
            .field("default", &self.default)
            .field("active", &self.active)
            .finish()
    }
}

impl Filter {
    pub fn new<F>(name: impl Into<String>, kinds: &[ItemKind], default: FilterDefault, predicate: F) -> Self
    where
        F: Fn(&TreeItem, &FilterContext<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kinds: kinds.to_vec(),
            default,
            predicate: Arc::new(predicate),
            interactive: None,
            active: true,
        }
    }

    /// Narrow whether a visible item may be selected or dragged.
    pub fn with_interactive<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&TreeItem, &FilterContext<'_>) -> bool + Send + Sync + 'static,
    {
        self.interactive = Some(Arc::new(predicate));
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    fn matches_kind(&self, item: &TreeItem) -> bool {
        self.kinds.contains(&item.kind())
    }

    pub fn passes(&self, item: &TreeItem, ctx: &FilterContext<'_>) -> bool {
        if !self.active {
            return true;
        }
        if self.matches_kind(item) {
            (self.predicate)(item, ctx)
        } else {
            self.default == FilterDefault::Pass
        }
    }

    /// Kinds the filter does not inspect stay interactive.
    pub fn is_interactive(&self, item: &TreeItem, ctx: &FilterContext<'_>) -> bool {
        match &self.interactive {
            Some(predicate) if self.active && self.matches_kind(item) => predicate(item, ctx),
            _ => true,
        }
    }
}

/// Case-insensitive label filter typed by the user.
#[derive(Debug, Clone)]
pub enum TextFilter {
    Substring(String),
    Pattern(Regex),
}

impl TextFilter {
    /// `re:` prefixes a regular expression, anything else is a substring.
    pub fn parse(text: &str) -> ApplicationResult<Option<Self>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        if let Some(pattern) = text.strip_prefix("re:") {
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|source| ApplicationError::InvalidFilter {
                    pattern: pattern.to_string(),
                    source,
                })?;
            return Ok(Some(TextFilter::Pattern(regex)));
        }
        Ok(Some(TextFilter::Substring(text.to_lowercase())))
    }

    pub fn matches(&self, label: &str) -> bool {
        match self {
            TextFilter::Substring(needle) => label.to_lowercase().contains(needle),
            TextFilter::Pattern(regex) => regex.is_match(label),
        }
    }
}

/// Filters compose by AND for visibility and for interactivity.
#[derive(Debug, Default)]
pub struct FilterSet {
    filters: Vec<Filter>,
    text: Option<TextFilter>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The filters every outliner registers, initially toggled per settings.
    pub fn builtin(settings: &FilterSettings) -> Self {
        let mut set = Self::new();
        set.add(
            Filter::new(ONLY_SELECTED, &[ItemKind::Object], FilterDefault::Fail, |item, ctx| {
                item.id
                    .as_object()
                    .map(|handle| ctx.selection.is_selected(handle))
                    .unwrap_or(false)
            })
            .with_active(settings.only_selected),
        );
        set.add(
            Filter::new(HIDE_TEMPORARY, &[ItemKind::Object], FilterDefault::Pass, |item, ctx| {
                object_info_flag(item, ctx, |info| !info.temporary)
            })
            .with_active(settings.hide_temporary),
        );
        set.add(
            Filter::new(HIDE_COMPONENTS, &[ItemKind::SubObject], FilterDefault::Pass, |_, _| false)
                .with_active(settings.hide_components),
        );
        set.add(
            Filter::new(HIDE_NESTED_SCOPES, &[ItemKind::Object], FilterDefault::Pass, |item, ctx| {
                object_info_flag(item, ctx, |info| info.owner.is_none())
            })
            .with_active(settings.hide_nested_scopes),
        );
        set.add(
            Filter::new(HIDE_UNLOADED, &[ItemKind::Unloaded], FilterDefault::Pass, |_, _| false)
                .with_active(settings.hide_unloaded),
        );
        set.add(
            Filter::new(
                NESTED_SCOPE_INTERACTION,
                &[ItemKind::Object, ItemKind::SubObject],
                FilterDefault::Pass,
                |_, _| true,
            )
            .with_interactive(|item, ctx| {
                owning_object(&item.id, ctx)
                    .map(|handle| owners_editing(handle, ctx.domain))
                    .unwrap_or(true)
            }),
        );
        set.add(
            Filter::new(LOCKED_INTERACTION, &[ItemKind::Object], FilterDefault::Pass, |_, _| true)
                .with_interactive(|item, ctx| object_info_flag(item, ctx, |info| !info.locked)),
        );
        set
    }

    pub fn add(&mut self, filter: Filter) {
        self.filters.retain(|existing| existing.name != filter.name);
        self.filters.push(filter);
    }

    pub fn get(&self, name: &str) -> Option<&Filter> {
        self.filters.iter().find(|filter| filter.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|filter| filter.name.as_str()).collect()
    }

    /// Toggle a filter. Returns `false` if no filter has that name.
    pub fn set_active(&mut self, name: &str, active: bool) -> bool {
        match self.filters.iter_mut().find(|filter| filter.name == name) {
            Some(filter) => {
                debug!(name, active, "filter toggled");
                filter.active = active;
                true
            }
            None => false,
        }
    }

    pub fn set_text(&mut self, text: &str) -> ApplicationResult<()> {
        self.text = TextFilter::parse(text)?;
        Ok(())
    }

    pub fn has_text(&self) -> bool {
        self.text.is_some()
    }

    pub fn passes(&self, item: &TreeItem, ctx: &FilterContext<'_>) -> bool {
        if let Some(text) = &self.text {
            if !text.matches(item.display_string()) {
                return false;
            }
        }
        self.filters.iter().all(|filter| filter.passes(item, ctx))
    }

    pub fn is_interactive(&self, item: &TreeItem, ctx: &FilterContext<'_>) -> bool {
        self.filters.iter().all(|filter| filter.is_interactive(item, ctx))
    }

    /// Stamp `can_interact` on the item and report whether it is visible.
    pub fn evaluate(&self, mut item: TreeItem, ctx: &FilterContext<'_>) -> (TreeItem, bool) {
        let visible = self.passes(&item, ctx);
        item.can_interact = self.is_interactive(&item, ctx);
        (item, visible)
    }
}

fn object_info_flag(
    item: &TreeItem,
    ctx: &FilterContext<'_>,
    flag: impl Fn(&crate::domain::ObjectInfo) -> bool,
) -> bool {
    item.id
        .as_object()
        .and_then(|handle| ctx.domain.object(handle))
        .map(|info| flag(&info))
        .unwrap_or(true)
}

/// The loaded object whose containers decide interactivity of `id`.
fn owning_object(id: &ItemId, ctx: &FilterContext<'_>) -> Option<ObjectHandle> {
    match id {
        ItemId::Object(handle) => Some(*handle),
        ItemId::SubObject(handle) => ctx.domain.sub_object(*handle).map(|sub| sub.owner),
        _ => None,
    }
}

/// True if every nested scope enclosing `handle` is being edited.
fn owners_editing(handle: ObjectHandle, domain: &dyn DomainAdapter) -> bool {
    let mut visited = std::collections::HashSet::new();
    let mut owner = domain.object(handle).and_then(|info| info.owner);
    while let Some(current) = owner {
        if !visited.insert(current) {
            return false;
        }
        match domain.object(current) {
            Some(info) if info.editing => owner = info.owner,
            _ => return false,
        }
    }
    true
}
