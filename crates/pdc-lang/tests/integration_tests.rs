use pdc_lang::{Args, Namespace, Options, RuntimeError, RuntimeValue, TemplateError};
use rstest::rstest;

#[rstest]
#[case::generator_of_strings(
    "def gen(n):\n    yield 'start'\n    for i in range(n):\n        yield 'item ' + str(i)",
    "gen",
    vec![RuntimeValue::Int(2)],
    RuntimeValue::list(vec!["start".into(), "item 0".into(), "item 1".into()])
)]
#[case::keyword_defaults(
    "def f(a, b=2, *rest, c=3, **kw):\n    return [a, b, len(rest), c, len(kw)]",
    "f",
    vec![RuntimeValue::Int(1), RuntimeValue::Int(5), RuntimeValue::Int(6), RuntimeValue::Int(7)],
    RuntimeValue::list(vec![
        RuntimeValue::Int(1),
        RuntimeValue::Int(5),
        RuntimeValue::Int(2),
        RuntimeValue::Int(3),
        RuntimeValue::Int(0),
    ])
)]
#[case::dict_iteration(
    "def f(d):\n    out = []\n    for k, v in d.items():\n        out.append(k + '=' + str(v))\n    return ', '.join(out)",
    "f",
    vec![RuntimeValue::dict(vec![("a".into(), RuntimeValue::Int(1)), ("b".into(), RuntimeValue::Int(2))])],
    RuntimeValue::str("a=1, b=2")
)]
fn test_call(
    #[case] code: &str,
    #[case] name: &str,
    #[case] args: Vec<RuntimeValue>,
    #[case] expected: RuntimeValue,
) {
    let namespace = Namespace::new("integration");
    namespace.exec(code).unwrap();

    assert_eq!(namespace.call(name, Args::new(args)).unwrap(), expected);
}

#[test]
fn test_template_error_propagates_unchanged() {
    let namespace = Namespace::new("integration");
    namespace.define_native("handler", |args| {
        let section = args.positional[0].to_string();
        let matched = args.positional[1].to_string();
        Err(TemplateError::new(&section, &matched, "no replacement").into())
    });
    namespace
        .exec("def convert():\n    yield handler('s', 'X', locals())")
        .unwrap();

    let err = namespace.call("convert", Args::default()).unwrap_err();
    assert_eq!(
        err,
        RuntimeError::Template(TemplateError::new("s", "X", "no replacement"))
    );
}

#[test]
fn test_recursion_limit() {
    let namespace = Namespace::with_options(
        "integration",
        None,
        Options {
            max_call_depth: 8,
            ..Options::default()
        },
    );
    namespace.exec("def down(n):\n    return down(n + 1)").unwrap();

    assert_eq!(
        namespace.call("down", Args::new(vec![RuntimeValue::Int(0)])),
        Err(RuntimeError::RecursionError(8))
    );
}

#[test]
fn test_partial_target_and_bound_args() {
    let namespace = Namespace::new("integration");
    namespace
        .exec("def f(a, b, c):\n    return a + b + c\np = partial(partial(f, 1), 2)")
        .unwrap();

    let Some(RuntimeValue::Partial(partial)) = namespace.get("p") else {
        panic!("p is not a partial");
    };
    assert!(matches!(partial.target(), RuntimeValue::Function(f) if f.name == "f"));
    assert_eq!(
        partial.bound_args().positional,
        vec![RuntimeValue::Int(1), RuntimeValue::Int(2)]
    );
    assert_eq!(
        namespace.call("p", Args::new(vec![RuntimeValue::Int(3)])),
        Ok(RuntimeValue::Int(6))
    );
}

#[test]
fn test_exec_reports_runtime_error_with_source() {
    let namespace = Namespace::new("integration");
    let err = namespace.exec("x = 1\ny = x / 0").unwrap_err();

    assert_eq!(err.source_code, "x = 1\ny = x / 0");
    assert_eq!(err.location.offset(), 10);
}
