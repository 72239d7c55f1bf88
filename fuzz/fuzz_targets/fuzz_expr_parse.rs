#![no_main]
use libfuzzer_sys::fuzz_target;
use tagtable_rs::Expr;

// Arbitrary text must parse or fail cleanly, and a parsed tree must survive
// a print/parse cycle unchanged.
fuzz_target!(|data: &str| {
    if let Ok(expr) = Expr::parse(data) {
        let printed = expr.to_string();
        let reparsed = Expr::parse(&printed).expect("canonical form must parse");
        assert_eq!(reparsed, expr);
    }
});
