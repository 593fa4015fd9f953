//! A flyweight tree view.
//!
//! Tree data lives in a plain [`ConfigTree`] arena. Only a handful of [`ViewNode`] instances exist per view type;
//! they are fetched from a [`ViewPool`], slid onto whichever node is being worked on and returned when dropped.
//!
//! Everything is single-threaded. [`TreeManager`] is the entry point.

#![doc(html_root_url = "https://docs.rs/flyweight-tree/0.0.1")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod config;
pub mod dom;
pub mod error;
pub mod manager;
pub mod pool;
mod rc_hash_map;
pub mod registry;
pub mod render;
pub mod view;

pub use config::{ConfigNode, ConfigTree, NodeKey};
pub use dom::{DomEvents, Surface, WebSurface};
pub use error::Error;
pub use manager::{DynamicLoader, LoadCallback, NodeEvent, Options, TreeManager, WeakTreeManager};
pub use pool::{ViewKey, ViewPool};
pub use registry::{AttrSpec, TypeRegistry, ViewClass, BASE_TYPE};
pub use render::{Renderer, Substitute};
pub use view::{NodeState, ViewNode};
