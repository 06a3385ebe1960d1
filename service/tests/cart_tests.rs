//! Cart operations and cart assembly over the in-memory environment.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::{harness, test_config};
use proptest::prelude::*;
use storefront_core::cart::CartEntry;
use storefront_core::environment::Clock;
use storefront_core::error::StorefrontError;
use storefront_core::ids::{ProductId, UserId};
use storefront_service::CartStore;
use storefront_service::backup::BackupWorkers;
use storefront_service::cart_store::cart_key;
use storefront_testing::{InMemoryCartBackend, InMemoryCatalog};

#[tokio::test]
async fn add_accumulates_and_materializes() {
    let h = harness();
    let product = h.env.seed_product(500, 10);
    let user = UserId::new();

    h.storefront.carts.add(user, product.id, 3, Some("gift")).await.expect("first add");
    let cart = h.storefront.carts.add(user, product.id, 4, None).await.expect("second add");

    assert_eq!(cart.total_items, 1);
    let line = &cart.items[0];
    assert_eq!(line.quantity, 7);
    assert_eq!(line.description, "gift");
    assert_eq!(line.product_name, "Widget");
    assert_eq!(line.seller_name, "Acme");
    assert_eq!(line.price, 500);
    assert!(!line.checked);
}

#[tokio::test]
async fn add_beyond_stock_is_rejected_and_leaves_cart_alone() {
    let h = harness();
    let product = h.env.seed_product(500, 5);
    let user = UserId::new();
    h.storefront.carts.add(user, product.id, 3, None).await.expect("add");

    let err = h.storefront.carts.add(user, product.id, 3, None).await.expect_err("over stock");

    assert!(matches!(
        err,
        StorefrontError::InsufficientStock { requested: 6, available: 5, .. }
    ));
    let cart = h.storefront.carts.get_cart(user).await.expect("cart");
    assert_eq!(cart.items[0].quantity, 3);
}

#[tokio::test]
async fn zero_quantity_add_is_a_validation_error() {
    let h = harness();
    let product = h.env.seed_product(500, 5);

    let err = h
        .storefront
        .carts
        .add(UserId::new(), product.id, 0, None)
        .await
        .expect_err("zero");

    assert!(matches!(err, StorefrontError::Validation(_)));
}

#[tokio::test]
async fn adding_an_unknown_product_is_not_found() {
    let h = harness();

    let err = h
        .storefront
        .carts
        .add(UserId::new(), ProductId::new(), 1, None)
        .await
        .expect_err("unknown");

    assert!(matches!(err, StorefrontError::NotFound { entity: "product", .. }));
}

#[tokio::test]
async fn negative_add_down_to_zero_removes_the_line() {
    let h = harness();
    let product = h.env.seed_product(500, 5);
    let user = UserId::new();
    h.storefront.carts.add(user, product.id, 2, None).await.expect("add");

    let cart = h.storefront.carts.add(user, product.id, -2, None).await.expect("take out");

    assert!(cart.is_empty());
    assert_eq!(h.env.cart_store().field_count(&cart_key(user)), 0);
}

#[tokio::test]
async fn update_to_zero_removes_the_line() {
    let h = harness();
    let product = h.env.seed_product(500, 5);
    let user = UserId::new();
    h.storefront.carts.add(user, product.id, 2, None).await.expect("add");

    let set = h
        .storefront
        .carts
        .update_quantity(user, product.id, 4, None)
        .await
        .expect("set");
    assert_eq!(set.items[0].quantity, 4);

    let cleared = h
        .storefront
        .carts
        .update_quantity(user, product.id, 0, None)
        .await
        .expect("clear");
    assert!(cleared.is_empty());
}

#[tokio::test]
async fn set_checked_requires_an_existing_line() {
    let h = harness();
    let product = h.env.seed_product(500, 5);
    let user = UserId::new();

    let err = h
        .storefront
        .carts
        .set_checked(user, product.id, true)
        .await
        .expect_err("no line");
    assert!(matches!(err, StorefrontError::NotFound { entity: "cart item", .. }));

    h.storefront.carts.add(user, product.id, 1, None).await.expect("add");
    let cart = h
        .storefront
        .carts
        .set_checked(user, product.id, true)
        .await
        .expect("check");
    assert!(cart.items[0].checked);
}

#[tokio::test]
async fn get_item_enriches_a_single_line() {
    let h = harness();
    let product = h.env.seed_product(750, 5);
    let user = UserId::new();
    h.storefront.carts.add(user, product.id, 2, Some("blue")).await.expect("add");

    let item = h.storefront.carts.get_item(user, product.id).await.expect("item");
    assert_eq!(item.quantity, 2);
    assert_eq!(item.description, "blue");
    assert_eq!(item.seller_name, "Acme");

    let err = h
        .storefront
        .carts
        .get_item(user, ProductId::new())
        .await
        .expect_err("missing");
    assert!(matches!(err, StorefrontError::NotFound { entity: "cart item", .. }));
}

#[tokio::test]
async fn lines_are_ordered_by_when_they_were_added() {
    let h = harness();
    let first = h.env.seed_product(100, 5);
    let second = h.env.seed_product(200, 5);
    let user = UserId::new();

    h.storefront.carts.add(user, second.id, 1, None).await.expect("add second");
    h.env.fixed_clock().advance(chrono::Duration::seconds(1));
    let cart = h.storefront.carts.add(user, first.id, 1, None).await.expect("add first");

    let order: Vec<ProductId> = cart.items.iter().map(|item| item.product_id).collect();
    assert_eq!(order, vec![second.id, first.id]);
}

#[tokio::test]
async fn assembly_drops_lines_without_product_or_seller_in_one_seller_call() {
    let h = harness();
    let kept = h.env.seed_product(100, 5);
    let orphan = h.env.seed_product_for(UserId::new(), "Orphan", 100, 5);
    let gone = h.env.seed_product(100, 5);
    let user = UserId::new();
    for id in [kept.id, orphan.id, gone.id] {
        h.storefront.carts.add(user, id, 1, None).await.expect("add");
    }
    h.storefront
        .catalog
        .delete(&common::seller(gone.seller_id), gone.id)
        .await
        .expect("delete");

    let calls_before = h.env.account_directory().seller_calls();
    let cart = h.storefront.carts.get_cart(user).await.expect("cart");

    assert_eq!(cart.total_items, 1);
    assert_eq!(cart.items[0].product_id, kept.id);
    assert_eq!(h.env.account_directory().seller_calls() - calls_before, 1);
    assert_eq!(h.env.cart_store().field_count(&cart_key(user)), 3, "lines are kept in the store");
}

#[tokio::test]
async fn account_outage_fails_assembly() {
    let h = harness();
    let product = h.env.seed_product(100, 5);
    let user = UserId::new();
    h.storefront.carts.add(user, product.id, 1, None).await.expect("add");
    h.env.account_directory().set_unavailable(true);

    let err = h.storefront.carts.get_cart(user).await.expect_err("accounts down");

    assert!(matches!(err, StorefrontError::Account(_)));
}

#[tokio::test]
async fn empty_cart_materializes_without_remote_calls() {
    let h = harness();

    let cart = h.storefront.carts.get_cart(UserId::new()).await.expect("cart");

    assert!(cart.is_empty());
    assert_eq!(cart.total_items, 0);
    assert_eq!(h.env.account_directory().seller_calls(), 0);
}

#[tokio::test]
async fn cart_writes_reach_the_mirror_and_restore_from_it() {
    let h = harness();
    let product = h.env.seed_product(100, 5);
    let user = UserId::new();
    h.storefront.carts.add(user, product.id, 2, Some("note")).await.expect("add");

    let env = std::sync::Arc::clone(&h.env);
    let carts = h.storefront.carts.clone();
    h.storefront.shutdown().await;

    let mirrored = env.catalog().mirrored(user, product.id).expect("mirrored line");
    assert_eq!(mirrored.quantity, 2);
    assert_eq!(mirrored.description, "note");

    env.cart_store().wipe(&cart_key(user));
    let restored = carts.restore(user).await.expect("restore");
    assert_eq!(restored, 1);

    let cart = carts.get_cart(user).await.expect("cart");
    assert_eq!(cart.items[0].quantity, 2);
    assert_eq!(cart.items[0].description, "note");
}

#[tokio::test]
async fn restore_skips_non_positive_mirror_rows() {
    let h = harness();
    let product = h.env.seed_product(100, 5);
    let user = UserId::new();
    let now = h.env.fixed_clock().now();
    h.env.catalog().seed_mirror(CartEntry {
        user_id: user,
        product_id: product.id,
        quantity: 0,
        description: String::new(),
        checked: false,
        created_at: now,
        updated_at: now,
    });

    let restored = h.storefront.carts.restore(user).await.expect("restore");

    assert_eq!(restored, 0);
    assert!(h.storefront.carts.get_cart(user).await.expect("cart").is_empty());
}

proptest! {
    #[test]
    fn accumulated_quantity_matches_running_sum(
        deltas in proptest::collection::vec(storefront_testing::properties::cart_delta(), 1..12)
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let config = test_config();
            let backend = InMemoryCartBackend::new();
            let (workers, queue) =
                BackupWorkers::start(InMemoryCatalog::new(), &config.cart, tracing::Span::none());
            let store = CartStore::new(backend, queue, config.cart.ttl, tracing::Span::none());
            let now = storefront_testing::test_clock().now();
            let (user, product) = (UserId::new(), ProductId::new());

            let mut expected = 0_i32;
            for delta in deltas {
                let line = store
                    .add_or_accumulate(user, product, delta, None, now)
                    .await
                    .unwrap();
                expected = (expected + delta).max(0);
                prop_assert_eq!(line.map_or(0, |l| l.quantity), expected);
            }

            let stored = store.get(user, product).await.unwrap();
            prop_assert_eq!(stored.map_or(0, |l| l.quantity), expected);
            workers.shutdown().await;
            Ok(())
        })?;
    }
}
