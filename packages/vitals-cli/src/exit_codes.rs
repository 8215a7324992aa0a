use vitals_rs::VitalsError;

pub const SUCCESS: i32 = 0;
pub const INPUT_ERROR: i32 = 1;
pub const EXECUTION_ERROR: i32 = 2;
pub const NO_DEVICE: i32 = 3;
pub const BUSY: i32 = 4;
pub const TIMEOUT: i32 = 5;
pub const CONNECTION_ERROR: i32 = 6;
pub const NO_READING: i32 = 7;

/// Exit code for an engine error.
pub fn for_error(err: &VitalsError) -> i32 {
    match err {
        VitalsError::NoDevice => NO_DEVICE,
        VitalsError::Busy => BUSY,
        VitalsError::Timeout(_) => TIMEOUT,
        VitalsError::Connection(_) => CONNECTION_ERROR,
        VitalsError::NoReading => NO_READING,
        VitalsError::InvalidConfig(_) => INPUT_ERROR,
        VitalsError::Sink(_) => EXECUTION_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_acquisition_failures_have_distinct_codes() {
        let codes = [
            for_error(&VitalsError::NoDevice),
            for_error(&VitalsError::Busy),
            for_error(&VitalsError::Timeout(Duration::from_secs(5))),
            for_error(&VitalsError::Connection("gone".into())),
        ];
        assert_eq!(codes, [NO_DEVICE, BUSY, TIMEOUT, CONNECTION_ERROR]);
        assert!(codes.iter().all(|c| *c != SUCCESS));
    }
}
