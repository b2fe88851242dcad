#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use testunit_rs::mock::{CallArgs, Signature};

#[derive(Arbitrary, Debug)]
enum FuzzParam {
    Positional(u8),
    Optional(u8),
    PositionalOnly(u8),
    VarArgs(u8),
    KeywordOnly(u8),
    KeywordOptional(u8),
    VarKwargs(u8),
}

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    params: Vec<FuzzParam>,
    positional: Vec<i64>,
    keywords: Vec<(u8, i64)>,
}

fn name(n: u8) -> String {
    format!("p{}", n % 8)
}

fuzz_target!(|input: FuzzInput| {
    let mut signature = Signature::new();
    for param in &input.params {
        signature = match param {
            FuzzParam::Positional(n) => signature.positional(&name(*n)),
            FuzzParam::Optional(n) => signature.optional(&name(*n)),
            FuzzParam::PositionalOnly(n) => signature.positional_only(&name(*n)),
            FuzzParam::VarArgs(n) => signature.var_args(&name(*n)),
            FuzzParam::KeywordOnly(n) => signature.keyword_only(&name(*n)),
            FuzzParam::KeywordOptional(n) => signature.keyword_optional(&name(*n)),
            FuzzParam::VarKwargs(n) => signature.var_kwargs(&name(*n)),
        };
    }

    let mut call = CallArgs::new();
    for value in &input.positional {
        call = call.arg(*value);
    }
    for (key, value) in &input.keywords {
        call = call.kw(name(*key), *value);
    }

    // Binding is pure: it either fails or yields the same bound arguments twice
    match (signature.bind(&call), signature.bind(&call)) {
        (Ok(a), Ok(b)) => assert_eq!(a, b, "Binding is not deterministic"),
        (Err(_), Err(_)) => {}
        _ => panic!("Binding is not deterministic - one call succeeded, other failed"),
    }
});
