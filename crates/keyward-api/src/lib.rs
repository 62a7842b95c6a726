//! # Keyward Admission API
//!
//! The HTTP surface external clients talk to: validates vault requests,
//! deduplicates sessions already in flight, and enqueues tasks for
//! `keyward-worker` to run. No MPC protocol work and no relay traffic
//! happens in this crate — it only ever reads a vault backup to decide
//! which engine variant a task needs.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use keyward_api::{AdmissionState, build_router};
//!
//! let router = build_router(state);
//! let listener = tokio::net::TcpListener::bind(addr).await?;
//! axum::serve(
//!     listener,
//!     router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
//! )
//! .await?;
//! ```
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod error;
pub mod gateway;

pub use error::ApiError;
pub use gateway::{build_router, AdmissionState};
