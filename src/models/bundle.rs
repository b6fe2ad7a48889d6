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

//! Bundle domain types.
//!
//! [`ScrapedBundle`] is the raw, untrusted record a scraper returns. It only
//! exists within one run. [`Bundle`] is the canonical, schema-conforming
//! record owned by the persistence engine; its `id` is the stable natural key
//! used for idempotent upserts and deactivation scoping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Supported currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::CAD => "CAD",
            Currency::AUD => "AUD",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "USD" => Some(Currency::USD),
            "EUR" => Some(Currency::EUR),
            "GBP" => Some(Currency::GBP),
            "CAD" => Some(Currency::CAD),
            "AUD" => Some(Currency::AUD),
            _ => None,
        }
    }
}

/// Billing cycle of an offer. Defaults to monthly when a scraper omits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillingCycle {
    #[serde(rename = "mo")]
    Mo,
    #[serde(rename = "yr")]
    Yr,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Mo => "mo",
            BillingCycle::Yr => "yr",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "mo" => Some(BillingCycle::Mo),
            "yr" => Some(BillingCycle::Yr),
            _ => None,
        }
    }
}

impl Default for BillingCycle {
    fn default() -> Self {
        BillingCycle::Mo
    }
}

/// Canonical provenance category of a bundle offer.
///
/// Values outside this set are treated as untagged rather than rejected;
/// deactivation sweeps only run for recognized values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleSource {
    Official,
    Carrier,
    Partner,
    Aggregator,
}

impl BundleSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BundleSource::Official => "official",
            BundleSource::Carrier => "carrier",
            BundleSource::Partner => "partner",
            BundleSource::Aggregator => "aggregator",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "official" => Some(BundleSource::Official),
            "carrier" => Some(BundleSource::Carrier),
            "partner" => Some(BundleSource::Partner),
            "aggregator" => Some(BundleSource::Aggregator),
            _ => None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Raw record returned by a scraper. Free-text service names, tags,
/// currency, and source; nothing here is trusted until the normalizer
/// has validated it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedBundle {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub services: Vec<String>,
    pub price: f64,
    pub currency: String,
    #[serde(default)]
    pub billing_cycle: Option<String>,
    #[serde(default)]
    pub regions: Vec<String>,
    pub provider: String,
    pub link: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub last_verified: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub raw_payload: Option<serde_json::Value>,
}

/// Canonical, validated bundle offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub id: String,
    pub name: String,
    pub services: Vec<String>,
    pub price: f64,
    pub currency: Currency,
    pub billing_cycle: BillingCycle,
    pub regions: Vec<String>,
    pub provider: String,
    pub link: String,
    pub tags: Vec<String>,
    pub summary: Option<String>,
    pub is_active: bool,
    pub last_verified: Option<DateTime<Utc>>,
    pub source: Option<BundleSource>,
    pub confidence: Option<f64>,
    pub raw_payload: Option<serde_json::Value>,
}

impl Bundle {
    /// Price in integer cents, the unit stored and tracked in history.
    pub fn price_cents(&self) -> i32 {
        (self.price * 100.0).round() as i32
    }
}
