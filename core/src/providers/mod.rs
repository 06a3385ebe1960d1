//! Collaborator traits.
//!
//! Every external dependency of the storefront services sits behind one of
//! these traits. Services are generic over them, so the same cart and checkout
//! logic runs against Postgres/Redis in production and against the in-memory
//! implementations in `storefront-testing`.
//!
//! ```text
//!                ┌──────────────────────┐
//!                │  storefront-service  │
//!                └──────────┬───────────┘
//!     ┌────────────┬────────┼─────────┬──────────────┐
//!     ▼            ▼        ▼         ▼              ▼
//! ProductRepo  CacheBackend CartBackend CartMirror AccountDirectory
//! Transactional   (redis)    (redis)   (postgres)     (http)
//!  (postgres)
//! ```

mod accounts;
mod cache;
mod cart;
mod catalog;

pub use accounts::{AccountDirectory, Principal, SellerProfile, TokenValidation};
pub use cache::CacheBackend;
pub use cart::{CartBackend, CartMirror};
pub use catalog::{ProductRepository, StoreTransaction, TransactionalStore};
