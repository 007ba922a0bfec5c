// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// LoTW report download endpoint.
pub const DEFAULT_LOTW_URL: &str = "https://lotw.arrl.org/lotwuser/lotwreport.adi";

/// LoTW only returns QSOs since the last download unless a start date is given.
pub const DEFAULT_START_DATE: &str = "1900-01-01";

/// Reports for large logs are slow to generate.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

pub const DEFAULT_FETCH_INTERVAL: Duration = Duration::from_secs(3600);
pub const MIN_FETCH_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on a single buffered record, 50 MiB.
pub const DEFAULT_MAX_RECORD_BYTES: usize = 50 * 1024 * 1024;

pub const DEFAULT_EXPORTER_HOST: &str = "0.0.0.0";
pub const DEFAULT_EXPORTER_PORT: u16 = 9321;
pub const DEFAULT_LOG_LEVEL: &str = "info";

pub const END_OF_RECORD: &[u8] = b"<eor>";
pub const END_OF_HEADER: &[u8] = b"<eoh>";

pub const FIELD_BAND: &str = "BAND";
pub const FIELD_MODE: &str = "MODE";
pub const FIELD_QSL_RCVD: &str = "QSL_RCVD";
pub const FIELD_DXCC: &str = "DXCC";
pub const FIELD_QSO_TIMESTAMP: &str = "APP_LOTW_QSO_TIMESTAMP";
pub const FIELD_QSO_DATE: &str = "QSO_DATE";
