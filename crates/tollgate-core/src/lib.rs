//! Tollgate Core - Domain models, error taxonomy, and shared types
//!
//! This crate defines the abstractions shared by the Tollgate client and server:
//! - Session, identity, and MFA challenge models
//! - The authentication error taxonomy and its wire codes
//! - Roles and validated permissions
//! - HTTP wire types
//! - Configuration management

pub mod config;
pub mod error;
pub mod model;
pub mod permission;
pub mod wire;

pub use config::{
    AppConfig, ConfigError, Environment, IdentityConfig, IdentityProviderKind, LogFormat,
    RateLimitConfig, SessionConfig,
};
pub use error::{AuthError, ErrorCode};
pub use model::{AuthFailure, AuthResult, Identity, MfaChallenge, MfaMethod, Session, UserProfile};
pub use permission::{Permission, PermissionError, PermissionSet, RoleId};
