#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use testunit_rs::args;
use testunit_rs::mock::{Mock, Setting, Value};

#[derive(Arbitrary, Debug)]
struct FuzzSetting {
    segments: Vec<u8>,
    value: i64,
}

const SEGMENTS: &[&str] = &[
    "return_value",
    "side_effect",
    "json",
    "get",
    "session",
    "call_count",
    "assert_called",
    "__iter__",
    "",
];

fuzz_target!(|settings: Vec<FuzzSetting>| {
    let paths: Vec<(String, i64)> = settings
        .iter()
        .map(|s| {
            let path: Vec<&str> = s
                .segments
                .iter()
                .map(|n| SEGMENTS[*n as usize % SEGMENTS.len()])
                .collect();
            (path.join("."), s.value)
        })
        .collect();

    let mock = Mock::named("root");
    // Configuration may be refused, but must never panic
    let _ = mock.configure(
        paths
            .iter()
            .map(|(path, value)| (path.as_str(), Setting::value(*value))),
    );

    // The mock stays callable and consistent afterwards
    let _ = mock.call(args![1]);
    let _ = mock.call(args![Value::from("x")]);
    mock.reset(false);
    assert_eq!(mock.call_count(), 0);
    assert!(mock.mock_calls().is_empty());
});
