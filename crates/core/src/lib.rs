// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! temper-core: data model and pure state for the temper pipeline engine

pub mod batch;
pub mod cancel;
pub mod clock;
pub mod error;
pub mod json;
pub mod lock;
pub mod mode;
pub mod query;
pub mod research;
pub mod status;
pub mod target;
pub mod work_item;
pub mod workflow;

pub use batch::Batch;
pub use cancel::CancelFlag;
pub use clock::{Clock, SharedClock, SystemClock};
pub use error::{sanitize_message, truncate_output, Error};
pub use json::parse_agent_json;
pub use lock::{LockGrant, LockManager, GRANT_TTL};
pub use mode::Mode;
pub use query::{prune_queries, Query, QueryStatus, MAX_QUERIES};
pub use research::{research_complete, research_slug, ResearchTopic, TopicStatus};
pub use status::{WorkflowStatus, ACTIVE_STATUSES};
pub use target::{risk_order, Target};
pub use work_item::{WorkItem, WorkItemStatus};
pub use workflow::Workflow;

#[cfg(any(test, feature = "test-support"))]
pub use clock::FakeClock;
