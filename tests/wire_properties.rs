//! Requests and responses keep their shape across the CLI and REST layers

use std::time::Duration;

use jasper_api::models::OutcomeResponse;
use jasper_cli::commands::client::{parse_request, ClientResponse};
use jasper_process::{CreateOptions, ProcessInfo};
use proptest::prelude::*;

proptest! {
    #[test]
    fn prop_create_request_roundtrip(
        args in prop::collection::vec("[a-z0-9_./-]{1,12}", 1..6),
        tags in prop::collection::vec("[a-z]{1,6}", 0..4),
        timeout in 0u64..3600,
    ) {
        let mut opts = CreateOptions::new(args).timeout(Duration::from_secs(timeout));
        for tag in tags {
            opts = opts.tag(tag);
        }
        let request = serde_json::to_string(&opts).unwrap();
        let parsed: CreateOptions = parse_request(&request).unwrap();
        prop_assert_eq!(parsed, opts);
    }

    #[test]
    fn prop_client_response_roundtrip(
        exit_codes in prop::collection::vec(-15i32..256, 0..5),
        success in any::<bool>(),
    ) {
        let infos: Vec<ProcessInfo> = exit_codes
            .iter()
            .enumerate()
            .map(|(i, code)| ProcessInfo {
                id: format!("process-{}", i),
                complete: true,
                successful: *code == 0,
                exit_code: *code,
                ..Default::default()
            })
            .collect();
        let outcome = if success {
            OutcomeResponse::ok()
        } else {
            OutcomeResponse::failure("boom")
        };
        let response = ClientResponse {
            outcome,
            infos: Some(infos),
            ..ClientResponse::ok()
        };

        let json = serde_json::to_string(&response).unwrap();
        let parsed: ClientResponse = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(parsed, response);
    }
}
