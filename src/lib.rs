// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # gyeol-progression
//!
//! Progression engine for conversational companion agents. Each agent has a
//! five-trait personality that drifts with conversation, a visual appearance
//! derived from it, and a generation (1..=5) that rises through probabilistic
//! evolution attempts and falls back after long inactivity.
//!
//! ## Architecture
//!
//! - **Personality** (`personality`, `visual`): clamped trait vectors and their rendering parameters
//! - **Analysis** (`analyzer`, `dialogue`): keyword rules or model replies turn dialogue into trait deltas
//! - **Progression** (`progression`, `readiness`): conversation counters, evolution meter, readiness policies
//! - **Lifecycle** (`evolution`, `probability`, `devolution`, `audit`): generation changes and their audit trail
//! - **Storage** (`store`): versioned records with compare-and-swap, in memory (DashMap) or durable (redb)
//!
//! ## Library usage
//!
//! ```no_run
//! use gyeol_progression::agent::AgentId;
//! use gyeol_progression::config::EngineConfig;
//! use gyeol_progression::engine::ProgressionEngine;
//!
//! let engine = ProgressionEngine::new(EngineConfig::default()).unwrap();
//! let id = AgentId::new(1).unwrap();
//! engine.create_agent(id).unwrap();
//! let report = engine.record_conversation_turn(id).unwrap();
//! let progress = engine.get_progress(id).unwrap();
//! println!("{} conversations, {}% ready", report.total_conversations, progress.overall_percent);
//! ```

pub mod agent;
pub mod analyzer;
pub mod audit;
pub mod config;
pub mod devolution;
pub mod dialogue;
pub mod engine;
pub mod error;
pub mod evolution;
pub mod personality;
pub mod probability;
pub mod progression;
pub mod readiness;
pub mod store;
pub mod visual;
