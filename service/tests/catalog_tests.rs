//! Catalog writes, stock adjustments and read-through caching.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::{admin, harness, seller};
use proptest::prelude::*;
use storefront_core::environment::Clock;
use storefront_core::error::StorefrontError;
use storefront_core::ids::{ProductId, UserId};
use storefront_core::product::{Product, ProductDraft, StockAdjustment};
use storefront_service::product_cache::{ALL_PRODUCTS, product_key, seller_key};
use storefront_service::{Config, ProductCache};
use storefront_testing::TestEnvironment;
use storefront_testing::properties::valid_product_draft;

fn draft(name: &str, price: i64, stock: i32) -> ProductDraft {
    ProductDraft {
        name: name.to_string(),
        price,
        stock,
        discount: 0,
        product_type: "kitchen".to_string(),
        description: String::new(),
    }
}

#[tokio::test]
async fn create_then_read_through_the_cache() {
    let h = harness();
    let owner = UserId::new();

    let created = h
        .storefront
        .catalog
        .create(&seller(owner), draft("Coffee Mug", 1200, 8))
        .await
        .expect("create");
    assert_eq!(created.seller_id, owner);

    let first = h.storefront.catalog.get(created.id).await.expect("first read");
    let second = h.storefront.catalog.get(created.id).await.expect("second read");

    assert_eq!(first, second);
    assert_eq!(h.env.catalog().product_reads(), 1);
    assert!(h.env.cache_store().contains(&product_key(created.id)));
}

#[tokio::test]
async fn invalid_draft_is_rejected() {
    let h = harness();

    let err = h
        .storefront
        .catalog
        .create(&seller(UserId::new()), draft("Mug", 0, 8))
        .await
        .expect_err("zero price");

    assert!(matches!(err, StorefrontError::Validation(_)));
}

#[tokio::test]
async fn list_all_is_served_from_cache_on_the_second_call() {
    let h = harness();
    let _ = h.env.seed_product(100, 1);
    let _ = h.env.seed_product(200, 1);

    let first = h.storefront.catalog.list_all().await.expect("first");
    let second = h.storefront.catalog.list_all().await.expect("second");

    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
    assert_eq!(h.env.catalog().product_reads(), 1);
    assert!(h.env.cache_store().contains(ALL_PRODUCTS));
}

#[tokio::test]
async fn update_is_visible_on_the_next_read() {
    let h = harness();
    let product = h.env.seed_product(100, 5);
    h.storefront.catalog.get(product.id).await.expect("warm cache");
    h.storefront.catalog.list_all().await.expect("warm list");

    let mut changed = draft("Renamed", 150, 5);
    changed.product_type = product.product_type.clone();
    h.storefront
        .catalog
        .update(&seller(product.seller_id), product.id, changed)
        .await
        .expect("update");

    let read = h.storefront.catalog.get(product.id).await.expect("read");
    assert_eq!(read.name, "Renamed");
    assert_eq!(read.price, 150);
    let listed = h.storefront.catalog.list_all().await.expect("list");
    assert_eq!(listed[0].name, "Renamed");
}

#[tokio::test]
async fn only_the_owner_or_an_admin_may_write() {
    let h = harness();
    let product = h.env.seed_product(100, 5);

    let err = h
        .storefront
        .catalog
        .update(&seller(UserId::new()), product.id, draft("Stolen", 100, 5))
        .await
        .expect_err("foreign seller");
    assert!(matches!(
        err,
        StorefrontError::Forbidden(ref reason) if reason == "product does not belong to seller"
    ));

    let err = h
        .storefront
        .catalog
        .delete(&seller(UserId::new()), product.id)
        .await
        .expect_err("foreign seller");
    assert!(matches!(err, StorefrontError::Forbidden(_)));

    h.storefront
        .catalog
        .delete(&admin(), product.id)
        .await
        .expect("admin deletes");
    let err = h.storefront.catalog.get(product.id).await.expect_err("gone");
    assert!(matches!(err, StorefrontError::NotFound { .. }));
}

#[tokio::test]
async fn writes_to_unknown_products_are_not_found() {
    let h = harness();

    let err = h
        .storefront
        .catalog
        .update(&admin(), ProductId::new(), draft("Ghost", 100, 1))
        .await
        .expect_err("unknown");

    assert!(matches!(err, StorefrontError::NotFound { entity: "product", .. }));
}

#[tokio::test]
async fn decrease_stock_is_all_or_nothing() {
    let h = harness();
    let a = h.env.seed_product(100, 10);
    let b = h.env.seed_product(100, 1);

    let err = h
        .storefront
        .catalog
        .decrease_stock(&[
            StockAdjustment { product_id: a.id, quantity: 4 },
            StockAdjustment { product_id: b.id, quantity: 2 },
        ])
        .await
        .expect_err("b is short");

    assert!(matches!(err, StorefrontError::InsufficientStock { .. }));
    assert_eq!(h.env.catalog().stock(a.id), Some(10));
    assert_eq!(h.env.catalog().stock(b.id), Some(1));
}

#[tokio::test]
async fn stock_adjustments_invalidate_cached_products() {
    let h = harness();
    let product = h.env.seed_product(100, 10);
    h.storefront.catalog.get(product.id).await.expect("warm cache");

    let updated = h
        .storefront
        .catalog
        .increase_stock(&[StockAdjustment { product_id: product.id, quantity: 5 }])
        .await
        .expect("increase");
    assert_eq!(updated[0].stock, 15);
    assert!(!h.env.cache_store().contains(&product_key(product.id)));

    let read = h.storefront.catalog.get(product.id).await.expect("read");
    assert_eq!(read.stock, 15);
}

#[tokio::test]
async fn non_positive_adjustment_is_a_validation_error() {
    let h = harness();
    let product = h.env.seed_product(100, 10);

    let err = h
        .storefront
        .catalog
        .decrease_stock(&[StockAdjustment { product_id: product.id, quantity: 0 }])
        .await
        .expect_err("zero");

    assert!(matches!(err, StorefrontError::Validation(_)));
}

#[tokio::test]
async fn blank_search_terms_are_rejected() {
    let h = harness();

    let by_name = h.storefront.catalog.search_by_name("  ").await.expect_err("blank name");
    let by_type = h.storefront.catalog.list_by_type("").await.expect_err("blank type");

    assert!(matches!(by_name, StorefrontError::Validation(_)));
    assert!(matches!(by_type, StorefrontError::Validation(_)));
}

#[tokio::test]
async fn seller_listing_is_cached_and_search_matches_names() {
    let h = harness();
    let owner = UserId::new();
    h.env.account_directory().add_seller(owner, "Leaf & Co");
    let tea = h.env.seed_product_for(owner, "Green Tea", 300, 10);
    let _ = h.env.seed_product_for(owner, "Black Tea", 300, 10);
    let _ = h.env.seed_product(100, 1);

    let listed = h.storefront.catalog.list_by_seller(owner).await.expect("by seller");
    assert_eq!(listed.len(), 2);
    assert!(h.env.cache_store().contains(&seller_key(owner)));

    let found = h.storefront.catalog.search_by_name("green").await.expect("search");
    assert_eq!(found, vec![tea]);
}

#[tokio::test]
async fn cache_outage_degrades_to_the_store() {
    let h = harness();
    let product = h.env.seed_product(100, 10);
    h.env.cache_store().set_unavailable(true);

    let first = h.storefront.catalog.get(product.id).await.expect("first");
    let second = h.storefront.catalog.get(product.id).await.expect("second");
    let all = h.storefront.catalog.list_all().await.expect("list");

    assert_eq!(first, second);
    assert_eq!(all.len(), 1);
    assert_eq!(h.env.catalog().product_reads(), 3);
}

#[tokio::test]
async fn store_outage_is_a_database_error() {
    let h = harness();
    let product = h.env.seed_product(100, 10);
    h.env.catalog().set_unavailable(true);

    let err = h.storefront.catalog.get(product.id).await.expect_err("store down");

    assert!(matches!(err, StorefrontError::Database(_)));
}

#[tokio::test]
async fn get_many_reads_misses_in_one_batch() {
    let h = harness();
    let a = h.env.seed_product(100, 1);
    let b = h.env.seed_product(200, 1);
    h.storefront.catalog.get(a.id).await.expect("warm a");

    let products = h
        .storefront
        .catalog
        .get_many(&[b.id, a.id, ProductId::new(), b.id])
        .await
        .expect("batch");

    let ids: Vec<ProductId> = products.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![b.id, a.id]);
    assert_eq!(h.env.catalog().batch_reads(), 1);
}

#[tokio::test]
async fn reset_drops_every_product_key_and_invalidation_is_idempotent() {
    let h = harness();
    let product = h.env.seed_product(100, 1);
    h.storefront.catalog.get(product.id).await.expect("item");
    h.storefront.catalog.list_all().await.expect("all");
    h.storefront.catalog.list_by_seller(product.seller_id).await.expect("seller");

    let cache = ProductCache::new(
        h.env.catalog().clone(),
        h.env.cache_store().clone(),
        Config::default().cache,
        tracing::Span::none(),
    );
    let removed = cache.invalidate_all().await.expect("reset");

    assert_eq!(removed, 2);
    assert!(h.env.cache_store().keys().is_empty());

    cache.invalidate(product.id).await;
    cache.invalidate(product.id).await;
    let read = cache.get(product.id).await.expect("read after invalidation");
    assert_eq!(read, product);
}

#[tokio::test]
async fn repeated_invalidation_leaves_item_and_list_keys_absent() {
    let h = harness();
    let product = h.env.seed_product(100, 1);
    let cache = ProductCache::new(
        h.env.catalog().clone(),
        h.env.cache_store().clone(),
        Config::default().cache,
        tracing::Span::none(),
    );
    cache.get(product.id).await.expect("warm item");
    cache.get_all().await.expect("warm list");

    cache.invalidate(product.id).await;
    let after_once = h.env.cache_store().keys();
    cache.invalidate(product.id).await;

    assert_eq!(h.env.cache_store().keys(), after_once);
    assert!(!h.env.cache_store().contains(&product_key(product.id)));
    assert!(!h.env.cache_store().contains(ALL_PRODUCTS));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn cached_product_reads_back_unchanged(generated in valid_product_draft()) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let env = TestEnvironment::new();
            let product = Product::from_draft(
                ProductId::new(),
                UserId::new(),
                generated,
                env.fixed_clock().now(),
            );
            env.catalog().seed(product.clone());
            let cache = ProductCache::new(
                env.catalog().clone(),
                env.cache_store().clone(),
                Config::default().cache,
                tracing::Span::none(),
            );

            let stored = cache.get(product.id).await.unwrap();
            let cached = cache.get(product.id).await.unwrap();

            prop_assert_eq!(&stored, &product);
            prop_assert_eq!(&cached, &product);
            prop_assert_eq!(env.catalog().product_reads(), 1);
            Ok(())
        })?;
    }
}
