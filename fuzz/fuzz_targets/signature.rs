#![no_main]

use libfuzzer_sys::fuzz_target;
use testunit_rs::mock::Signature;

fuzz_target!(|data: &[u8]| {
    let input = String::from_utf8_lossy(data);

    // Parsing must never panic, and must be deterministic
    let first = Signature::parse(&input);
    let second = Signature::parse(&input);
    match (&first, &second) {
        (Ok(a), Ok(b)) => assert_eq!(a, b, "Signature parsing is not deterministic"),
        (Err(_), Err(_)) => {}
        _ => panic!("Signature parsing is not deterministic - one call succeeded, other failed"),
    }

    if let Ok(signature) = first {
        // Parameter names are unique in a well-formed signature
        let mut names: Vec<&str> = signature.params().iter().map(|p| p.name.as_str()).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total, "Duplicate parameter accepted: {:?}", signature);
    }
});
