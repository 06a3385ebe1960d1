//! Identifier newtypes.
//!
//! All identities in the system are UUIDs. Wrapping them keeps a product id from
//! being passed where a user id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            #[must_use]
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// The underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a product.
    ProductId
);

uuid_id!(
    /// Unique identifier for a user (shoppers and sellers alike).
    UserId
);

uuid_id!(
    /// Unique identifier for an order.
    OrderId
);

uuid_id!(
    /// Unique identifier for an order line.
    OrderItemId
);

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_agree() {
        let id = ProductId::new();
        let parsed: ProductId = id.to_string().parse().expect("valid uuid");
        assert_eq!(parsed, id);
    }

    #[test]
    fn parse_rejects_non_uuid() {
        assert!("cart:abc".parse::<UserId>().is_err());
    }

    #[test]
    fn serializes_as_bare_uuid_string() {
        let id = OrderId::new();
        let json = serde_json::to_string(&id).expect("serializable");
        assert_eq!(json, format!("\"{id}\""));
    }
}
