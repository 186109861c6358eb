//! Object categories the user assigns strokes to.
//!
//! Index 0 is always the implicit `background` category. A session only counts
//! as having a category once at least one other category exists.

use std::sync::{Arc, Mutex};

use log::{info, warn};

use crate::core::backend::{BackendLink, ModelParam, Outbound};
use crate::core::backend_events::*;
use crate::core::event_bus::EventBus;
use crate::core::prompt::Prompt;
use crate::core::session::{Affordances, SessionState};
use crate::core::ui_events::*;
use crate::error::{Error, Result, recover};

pub const ORIGIN: &str = "categories";
pub const BACKGROUND: &str = "background";

#[derive(Debug)]
struct CategoryState {
    names: Vec<String>,
    active: usize,
    /// Mirrors the category affordance.
    adding_enabled: bool,
    session: SessionState,
}

impl Default for CategoryState {
    fn default() -> Self {
        Self {
            names: vec![BACKGROUND.to_string()],
            active: 0,
            adding_enabled: false,
            session: SessionState::NoSession,
        }
    }
}

#[derive(Clone)]
pub struct CategoryRegistry {
    state: Arc<Mutex<CategoryState>>,
    bus: EventBus,
    link: Arc<dyn BackendLink>,
    prompt: Arc<dyn Prompt>,
}

impl CategoryRegistry {
    pub fn new(bus: EventBus, link: Arc<dyn BackendLink>, prompt: Arc<dyn Prompt>) -> Self {
        Self {
            state: Arc::new(Mutex::new(CategoryState::default())),
            bus,
            link,
            prompt,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CategoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn attach(&self) {
        let bus = &self.bus;

        let this = self.clone();
        bus.subscribe::<CategoryAdded, _>(CATEGORY_ADDED, ORIGIN, move |e| this.add(&e.name).or_else(recover));
        let this = self.clone();
        bus.subscribe::<CategoriesSnapshot, _>(CATEGORIES_SNAPSHOT, ORIGIN, move |e| {
            this.load(e.categories.iter().map(String::as_str))
        });
        let this = self.clone();
        bus.subscribe::<KeyPressed, _>(KEY_PRESSED, ORIGIN, move |e| match e.key.parse::<usize>() {
            Ok(idx) => this.select(idx),
            Err(_) => Ok(()),
        });
        let this = self.clone();
        bus.subscribe::<Affordances, _>(AFFORDANCE_STATE, ORIGIN, move |a| {
            this.lock().adding_enabled = a.category;
            Ok(())
        });
        let this = self.clone();
        bus.subscribe::<SessionStateChanged, _>(SESSION_STATE_CHANGED, ORIGIN, move |e| {
            this.lock().session = e.state;
            Ok(())
        });
        let this = self.clone();
        bus.subscribe::<SessionReset, _>(SESSION_RESET, ORIGIN, move |_| this.reset());
    }

    /// User created a category: register it and tell the backend.
    pub fn add(&self, name: &str) -> Result<()> {
        let name = name.trim();
        let rejection = {
            let st = self.lock();
            if !st.adding_enabled {
                Some((st.session, "Categories can't be added right now.".to_string()))
            } else if name.is_empty() || name == BACKGROUND || st.names.iter().any(|n| n == name) {
                Some((st.session, format!("Invalid category name '{}'.", name)))
            } else {
                None
            }
        };
        if let Some((state, reason)) = rejection {
            warn!("Category '{}' rejected: {}", name, reason);
            self.prompt.warn(&reason);
            return Err(Error::illegal("add category", state, reason));
        }

        self.link.send(&Outbound::ChangeModelParam(ModelParam::Category {
            name: name.to_string(),
        }))?;
        let first_real = {
            let mut st = self.lock();
            st.names.push(name.to_string());
            st.names.len() == 2
        };
        info!("Category added: {}", name);
        self.publish_names()?;
        if first_real {
            self.select(1)?;
        }
        Ok(())
    }

    /// Backend's category list replaces ours without echoing back.
    pub fn load<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<()> {
        let count = {
            let mut st = self.lock();
            st.names = vec![BACKGROUND.to_string()];
            st.names
                .extend(names.into_iter().filter(|n| *n != BACKGROUND).map(str::to_string));
            st.active = 0;
            st.names.len()
        };
        self.publish_names()?;
        if count >= 2 { self.select(1) } else { self.select(0) }
    }

    /// Back to background only.
    pub fn reset(&self) -> Result<()> {
        {
            let mut st = self.lock();
            st.names = vec![BACKGROUND.to_string()];
            st.active = 0;
        }
        self.publish_names()?;
        self.select(0)
    }

    /// Make `index` the active category. Out-of-range indices are ignored.
    pub fn select(&self, index: usize) -> Result<()> {
        {
            let mut st = self.lock();
            if index >= st.names.len() {
                return Ok(());
            }
            st.active = index;
        }
        self.bus
            .publish(ACTIVE_CATEGORY_CHANGED, &ActiveCategoryChanged { index })
    }

    fn publish_names(&self) -> Result<()> {
        let names = self.names();
        self.bus.publish(CATEGORIES_CHANGED, &CategoriesChanged { names })
    }

    // ========== Accessors ==========

    /// True once a non-background category exists.
    pub fn has_category(&self) -> bool {
        self.lock().names.len() >= 2
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().names.clone()
    }

    pub fn active(&self) -> usize {
        self.lock().active
    }
}
