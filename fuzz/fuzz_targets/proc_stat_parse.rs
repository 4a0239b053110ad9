#![no_main]

use libfuzzer_sys::fuzz_target;
use pkgate_authorizer::{parse_start_time, StatParseError, StatRecord};

fuzz_target!(|data: &[u8]| {
    match StatRecord::parse(data) {
        Ok(record) => match record.start_time() {
            Ok(ticks) => assert_eq!(parse_start_time(data), Ok(ticks)),
            Err(error) => {
                assert!(matches!(error, StatParseError::InvalidStartTime { .. }));
                assert_eq!(parse_start_time(data), Err(error));
            }
        },
        Err(error) => {
            assert!(!matches!(error, StatParseError::InvalidStartTime { .. }));
            assert!(!error.to_string().trim().is_empty());
        }
    }
});
