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

//! Diesel table definitions, one module per backend.

#[cfg(feature = "postgres")]
pub mod postgres {
    diesel::table! {
        jobs (id) {
            id -> Uuid,
            job_type -> Varchar,
            payload -> Text,
            status -> Varchar,
            priority -> Int4,
            attempts -> Int4,
            max_attempts -> Int4,
            last_error -> Nullable<Text>,
            scheduled_at -> Timestamp,
            claimed_at -> Nullable<Timestamp>,
            started_at -> Nullable<Timestamp>,
            completed_at -> Nullable<Timestamp>,
            created_at -> Timestamp,
        }
    }
}

#[cfg(feature = "sqlite")]
pub mod sqlite {
    diesel::table! {
        jobs (id) {
            id -> Binary,
            job_type -> Text,
            payload -> Text,
            status -> Text,
            priority -> Integer,
            attempts -> Integer,
            max_attempts -> Integer,
            last_error -> Nullable<Text>,
            scheduled_at -> Text,
            claimed_at -> Nullable<Text>,
            started_at -> Nullable<Text>,
            completed_at -> Nullable<Text>,
            created_at -> Text,
        }
    }
}
