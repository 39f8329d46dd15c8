/*
 *  Copyright 2025-2026 Colliery Software
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

//! Data Access Layer with runtime backend selection.
//!
//! Every row mutation of the `jobs` table lives here. Each operation has one
//! implementation per backend, selected at runtime with
//! [`crate::dispatch_backend!`]:
//!
//! - PostgreSQL claims use `SELECT ... FOR UPDATE SKIP LOCKED` followed by an
//!   `UPDATE` in the same transaction.
//! - SQLite claims run inside an `IMMEDIATE` transaction, which takes the
//!   write lock before the read.

pub mod job;
pub mod models;

pub use job::JobDAL;

use crate::database::{BackendType, Database};

/// Entry point to the data access layer.
#[derive(Clone, Debug)]
pub struct DAL {
    pub database: Database,
}

impl DAL {
    pub fn new(database: Database) -> Self {
        DAL { database }
    }

    pub fn backend(&self) -> BackendType {
        self.database.backend()
    }

    pub fn job(&self) -> JobDAL<'_> {
        JobDAL::new(self)
    }
}
