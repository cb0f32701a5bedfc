//! Property-based tests for parsing, rendering and evaluation.
use pdc_lang::{Args, Namespace, RuntimeValue, repr_str};
use proptest::prelude::*;

mod strategies {
    use super::*;

    /// Identifiers that can never collide with a keyword.
    pub fn ident() -> impl Strategy<Value = String> {
        "v_[a-z0-9_]{0,8}"
    }

    pub fn statement() -> impl Strategy<Value = String> {
        (ident(), 0i64..1000, 0i64..1000).prop_flat_map(|(name, a, b)| {
            prop_oneof![
                Just(format!("{name} = [{a}, {b}]")),
                Just(format!("{name} = {a} + {b} * {name}")),
                Just(format!("if {name} > {a}:\n    {name} = {b}\nelse:\n    {name} = {a}")),
                Just(format!("for {name} in range({a}):\n    print({name}, {b})")),
            ]
        })
    }
}

proptest! {
    #[test]
    fn test_render_is_idempotent(statements in prop::collection::vec(strategies::statement(), 1..6)) {
        let code = statements.join("\n");
        let rendered = pdc_lang::render(&pdc_lang::parse(&code).unwrap());
        let rerendered = pdc_lang::render(&pdc_lang::parse(&rendered).unwrap());

        prop_assert_eq!(rendered, rerendered);
    }

    #[test]
    fn test_string_repr_evaluates_to_itself(text in "[a-zA-Z0-9 '\"\\\\\n\t]{0,16}") {
        let namespace = Namespace::new("strings");
        namespace.exec(&format!("x = {}", repr_str(&text))).unwrap();

        prop_assert_eq!(namespace.get("x"), Some(RuntimeValue::str(&text)));
    }

    #[test]
    fn test_integer_arithmetic(a in 0i64..1000, b in 0i64..1000, c in 0i64..1000) {
        let namespace = Namespace::new("arith");
        namespace.exec("def f(a, b, c):\n    return a + b * c - a").unwrap();

        let result = namespace.call(
            "f",
            Args::new(vec![RuntimeValue::Int(a), RuntimeValue::Int(b), RuntimeValue::Int(c)]),
        );
        prop_assert_eq!(result, Ok(RuntimeValue::Int(a + b * c - a)));
    }
}
