// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Response types sent by the daemon.

use crate::status::StatusReport;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Ok,
    Error { message: String },
    Status(StatusReport),
    /// One rendered log line of a `logs_stream` subscription. The daemon
    /// keeps sending these until the client hangs up.
    Log { line: String },
    /// The brokered password for an authenticated askpass request.
    Askpass { password: String },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error { message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn responses_roundtrip_json() {
        let responses = vec![
            Response::Ok,
            Response::error("no such tunnel"),
            Response::Log { line: "12:00:01 state context: home -> office".into() },
            Response::Askpass { password: "hunter2".into() },
        ];
        for response in responses {
            let json = serde_json::to_string(&response).unwrap();
            let back: Response = serde_json::from_str(&json).unwrap();
            assert_eq!(back, response);
        }
    }
}
