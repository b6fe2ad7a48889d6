/*
 *  Copyright 2025 SmartBundle Contributors
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Integration tests for the transactional persistence engine: upsert,
//! change detection, history capture, deactivation sweep, rollback.

mod common;

use chrono::Utc;
use diesel::RunQueryDsl;

use common::{bundle, test_store};
use smartbundle_ingest::models::{BillingCycle, BundleSource, Currency};

#[tokio::test]
async fn persisting_twice_is_idempotent() {
    let store = test_store().await;
    let input = vec![
        bundle("duo-1", Some(BundleSource::Carrier)),
        bundle("duo-2", Some(BundleSource::Carrier)),
        bundle("duo-3", Some(BundleSource::Carrier)),
    ];

    let first = store
        .dal
        .bundles()
        .persist("run-1", "carrier", Utc::now(), &input)
        .await
        .unwrap();
    assert_eq!(first.created, 3);
    assert_eq!(first.updated, 0);
    assert_eq!(first.skipped, 0);
    assert_eq!(first.history, 3);
    assert_eq!(first.upserts(), 3);

    let second = store
        .dal
        .bundles()
        .persist("run-2", "carrier", Utc::now(), &input)
        .await
        .unwrap();
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.skipped, 3);
    assert_eq!(second.history, 0);
    assert_eq!(second.deactivated, 0);
}

#[tokio::test]
async fn price_change_updates_row_and_appends_history() {
    let store = test_store().await;
    let mut offer = bundle("duo-1", Some(BundleSource::Carrier));

    store
        .dal
        .bundles()
        .persist("run-1", "carrier", Utc::now(), &[offer.clone()])
        .await
        .unwrap();

    offer.price = 19.99;
    let result = store
        .dal
        .bundles()
        .persist("run-2", "carrier", Utc::now(), &[offer.clone()])
        .await
        .unwrap();
    assert_eq!(result.updated, 1);
    assert_eq!(result.history, 1);

    let row = store.dal.bundles().get("duo-1").await.unwrap().unwrap();
    assert_eq!(row.price_cents, 1999);

    let history = store.dal.bundles().history("duo-1").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].price_cents, 1499);
    assert_eq!(history[1].price_cents, 1999);
}

#[tokio::test]
async fn name_only_change_updates_without_history() {
    let store = test_store().await;
    let mut offer = bundle("duo-1", Some(BundleSource::Carrier));

    store
        .dal
        .bundles()
        .persist("run-1", "carrier", Utc::now(), &[offer.clone()])
        .await
        .unwrap();

    offer.name = "Renamed Duo".to_string();
    offer.tags.push("promo".to_string());
    let result = store
        .dal
        .bundles()
        .persist("run-2", "carrier", Utc::now(), &[offer.clone()])
        .await
        .unwrap();
    assert_eq!(result.updated, 1);
    assert_eq!(result.history, 0);

    let history = store.dal.bundles().history("duo-1").await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn billing_cycle_change_appends_history() {
    let store = test_store().await;
    let mut offer = bundle("duo-1", Some(BundleSource::Carrier));

    store
        .dal
        .bundles()
        .persist("run-1", "carrier", Utc::now(), &[offer.clone()])
        .await
        .unwrap();

    offer.billing_cycle = BillingCycle::Yr;
    let result = store
        .dal
        .bundles()
        .persist("run-2", "carrier", Utc::now(), &[offer])
        .await
        .unwrap();
    assert_eq!(result.history, 1);

    let history = store.dal.bundles().history("duo-1").await.unwrap();
    assert_eq!(history[1].billing_cycle, "yr");
}

#[tokio::test]
async fn sweep_deactivates_missing_bundles_scoped_by_source() {
    let store = test_store().await;
    let a = bundle("carrier-a", Some(BundleSource::Carrier));
    let b = bundle("carrier-b", Some(BundleSource::Carrier));
    let other = bundle("official-c", Some(BundleSource::Official));

    store
        .dal
        .bundles()
        .persist("run-1", "carrier", Utc::now(), &[a.clone(), b.clone()])
        .await
        .unwrap();
    store
        .dal
        .bundles()
        .persist("run-2", "official", Utc::now(), &[other.clone()])
        .await
        .unwrap();

    // Only A reappears for the carrier source: B gets retired, the
    // official bundle is untouched.
    let result = store
        .dal
        .bundles()
        .persist("run-3", "carrier", Utc::now(), &[a.clone()])
        .await
        .unwrap();
    assert_eq!(result.skipped, 1);
    assert_eq!(result.deactivated, 1);

    let row_a = store.dal.bundles().get("carrier-a").await.unwrap().unwrap();
    let row_b = store.dal.bundles().get("carrier-b").await.unwrap().unwrap();
    let row_c = store.dal.bundles().get("official-c").await.unwrap().unwrap();
    assert_eq!(row_a.is_active, 1);
    assert_eq!(row_b.is_active, 0);
    assert_eq!(row_c.is_active, 1);

    // A later official run must not resurrect or re-retire carrier rows.
    store
        .dal
        .bundles()
        .persist("run-4", "official", Utc::now(), &[other])
        .await
        .unwrap();
    let row_b = store.dal.bundles().get("carrier-b").await.unwrap().unwrap();
    assert_eq!(row_b.is_active, 0);
}

#[tokio::test]
async fn unrecognized_job_source_skips_the_sweep() {
    let store = test_store().await;
    let existing = bundle("carrier-a", Some(BundleSource::Carrier));
    store
        .dal
        .bundles()
        .persist("run-1", "carrier", Utc::now(), &[existing])
        .await
        .unwrap();

    // Job source outside the canonical enum: rows persist untagged and
    // nothing is swept.
    let untagged = bundle("deal-1", None);
    let result = store
        .dal
        .bundles()
        .persist("run-2", "mobile-deals", Utc::now(), &[untagged])
        .await
        .unwrap();
    assert_eq!(result.created, 1);
    assert_eq!(result.deactivated, 0);

    let row = store.dal.bundles().get("deal-1").await.unwrap().unwrap();
    assert_eq!(row.source, None);
    let carrier = store.dal.bundles().get("carrier-a").await.unwrap().unwrap();
    assert_eq!(carrier.is_active, 1);
}

#[tokio::test]
async fn sweep_spares_rows_touched_after_run_start() {
    let store = test_store().await;
    let a = bundle("carrier-a", Some(BundleSource::Carrier));
    let b = bundle("carrier-b", Some(BundleSource::Carrier));

    // Stale view: this run started before B was (re)written, so it must
    // not retire B even though B is absent from its input.
    let stale_started_at = Utc::now();
    store
        .dal
        .bundles()
        .persist("run-1", "carrier", Utc::now(), &[a.clone(), b])
        .await
        .unwrap();

    let result = store
        .dal
        .bundles()
        .persist("run-2", "carrier", stale_started_at, &[a])
        .await
        .unwrap();
    assert_eq!(result.deactivated, 0);

    let row_b = store.dal.bundles().get("carrier-b").await.unwrap().unwrap();
    assert_eq!(row_b.is_active, 1);
}

#[tokio::test]
async fn empty_input_is_a_no_op() {
    let store = test_store().await;
    store
        .dal
        .bundles()
        .persist("run-1", "carrier", Utc::now(), &[bundle("carrier-a", Some(BundleSource::Carrier))])
        .await
        .unwrap();

    let result = store
        .dal
        .bundles()
        .persist("run-2", "carrier", Utc::now(), &[])
        .await
        .unwrap();
    assert_eq!(result.created + result.updated + result.skipped, 0);
    assert_eq!(result.deactivated, 0);

    // An empty scrape must not retire the whole source.
    let row = store.dal.bundles().get("carrier-a").await.unwrap().unwrap();
    assert_eq!(row.is_active, 1);
}

#[tokio::test]
async fn bundle_source_falls_back_to_job_source() {
    let store = test_store().await;
    let offer = bundle("carrier-a", None);
    store
        .dal
        .bundles()
        .persist("run-1", "carrier", Utc::now(), &[offer])
        .await
        .unwrap();

    let row = store.dal.bundles().get("carrier-a").await.unwrap().unwrap();
    assert_eq!(row.source.as_deref(), Some("carrier"));
}

#[tokio::test]
async fn currency_round_trips_through_the_store() {
    let store = test_store().await;
    let mut offer = bundle("eur-1", Some(BundleSource::Partner));
    offer.currency = Currency::EUR;
    store
        .dal
        .bundles()
        .persist("run-1", "partner", Utc::now(), &[offer])
        .await
        .unwrap();

    let row = store.dal.bundles().get("eur-1").await.unwrap().unwrap();
    assert_eq!(row.currency, "EUR");
    let history = store.dal.bundles().history("eur-1").await.unwrap();
    assert_eq!(history[0].currency, "EUR");
}

#[tokio::test]
async fn unchanged_reappearance_of_a_swept_bundle_stays_inactive() {
    let store = test_store().await;
    let duo = bundle("duo-1", Some(BundleSource::Carrier));
    let trio = bundle("duo-2", Some(BundleSource::Carrier));

    store
        .dal
        .bundles()
        .persist("run-1", "carrier", Utc::now(), &[duo.clone(), trio.clone()])
        .await
        .unwrap();
    store
        .dal
        .bundles()
        .persist("run-2", "carrier", Utc::now(), &[trio.clone()])
        .await
        .unwrap();
    assert_eq!(
        store.dal.bundles().get("duo-1").await.unwrap().unwrap().is_active,
        0
    );

    // The sweep does not rewrite data_hash, so a byte-identical re-listing
    // still hash-matches and is skipped rather than reactivated.
    let relisted = store
        .dal
        .bundles()
        .persist("run-3", "carrier", Utc::now(), &[duo, trio])
        .await
        .unwrap();
    assert_eq!(relisted.skipped, 2);
    assert_eq!(
        store.dal.bundles().get("duo-1").await.unwrap().unwrap().is_active,
        0
    );
}

#[tokio::test]
async fn mid_run_failure_rolls_back_everything() {
    let store = test_store().await;
    let input = vec![
        bundle("duo-1", Some(BundleSource::Carrier)),
        bundle("duo-2", Some(BundleSource::Carrier)),
    ];

    // Break the history table so the transaction fails after the bundle
    // rows were inserted.
    let conn = store.database.get_connection().await.unwrap();
    conn.interact(|conn| {
        diesel::sql_query("ALTER TABLE bundle_history RENAME TO bundle_history_hidden")
            .execute(conn)
    })
    .await
    .unwrap()
    .unwrap();
    // The pool holds a single connection; return it before persisting.
    drop(conn);

    let result = store
        .dal
        .bundles()
        .persist("run-1", "carrier", Utc::now(), &input)
        .await;
    assert!(result.is_err());
    assert!(store.dal.bundles().get("duo-1").await.unwrap().is_none());

    // Restore the table; the retried run sees a clean slate.
    let conn = store.database.get_connection().await.unwrap();
    conn.interact(|conn| {
        diesel::sql_query("ALTER TABLE bundle_history_hidden RENAME TO bundle_history")
            .execute(conn)
    })
    .await
    .unwrap()
    .unwrap();
    drop(conn);

    let retried = store
        .dal
        .bundles()
        .persist("run-1", "carrier", Utc::now(), &input)
        .await
        .unwrap();
    assert_eq!(retried.created, 2);
    assert_eq!(retried.history, 2);
    assert_eq!(store.dal.bundles().history("duo-1").await.unwrap().len(), 1);
}
