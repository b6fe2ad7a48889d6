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

//! Domain model types shared across the pipeline.

pub mod bundle;
pub mod ingestion_run;
pub mod job;

pub use bundle::{BillingCycle, Bundle, BundleSource, Currency, ScrapedBundle};
pub use ingestion_run::{IngestionRun, RunStatus};
pub use job::{IngestionJob, JobStatus};
