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

//! Well-known job type tags.
//!
//! The queue treats `job_type` as an open-ended string. These constants exist
//! so producers and handler registrations agree on spelling; nothing in the
//! core branches on them.

// Notifications
pub const SEND_EMAIL: &str = "send_email";
pub const SEND_SMS: &str = "send_sms";
pub const SEND_PUSH_NOTIFICATION: &str = "send_push_notification";

// Payments and escrow
pub const PROCESS_PAYMENT: &str = "process_payment";
pub const RELEASE_ESCROW: &str = "release_escrow";
pub const PROCESS_REFUND: &str = "process_refund";
pub const RECONCILE_PAYMENTS: &str = "reconcile_payments";

// Recommendations and analytics
pub const UPDATE_RECOMMENDATIONS: &str = "update_recommendations";
pub const CALCULATE_ANALYTICS: &str = "calculate_analytics";
pub const UPDATE_VENDOR_RANKS: &str = "update_vendor_ranks";
pub const DETECT_LIFE_EVENTS: &str = "detect_life_events";
pub const PROCESS_REFERRALS: &str = "process_referrals";

// Maintenance
pub const CLEANUP_SESSIONS: &str = "cleanup_sessions";
pub const CLEANUP_EXPIRED: &str = "cleanup_expired";
pub const ARCHIVE_OLD_DATA: &str = "archive_old_data";
