use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo;
use rstest::rstest;
use tempfile::TempDir;

const MODULE: &str = "def handler(section, matched, values):
    return str(values['n'])

def double(n, x):
    # PDC-Function
    N = n
    # PDC-Start body
    # PDC-TemplateCode
    # PDC-Replace N
    print(N * x)
    # PDC-End body
";

fn create_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).expect("Failed to write temp file");
    path
}

#[test]
fn test_sections() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let module = create_file(&dir, "module.pd", MODULE);

    cargo::cargo_bin_cmd!("pdc")
        .arg("sections")
        .arg(&module)
        .arg("double")
        .assert()
        .success()
        .stdout("__pdc_function (line 5)\n  body (line 7) [TemplateCode, Replace]\n");

    Ok(())
}

#[test]
fn test_convert() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let module = create_file(&dir, "module.pd", MODULE);

    cargo::cargo_bin_cmd!("pdc")
        .arg("convert")
        .arg(&module)
        .arg("double")
        .assert()
        .success()
        .stdout(
            "def __pdc_conversion_0(n, x):
    N = n
    print(N * x)
    yield 'print(' + __pdc_template_0('body', 'N', locals()) + ' * x)'
",
        );

    Ok(())
}

#[test]
fn test_convert_with_config() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let module = create_file(&dir, "module.pd", MODULE);
    let config = create_file(&dir, "pdc.toml", "conversion-name = \"conv_\"\ntemplate-name-prefix = \"tpl_\"\n");

    let assert = cargo::cargo_bin_cmd!("pdc")
        .arg("--config")
        .arg(&config)
        .arg("convert")
        .arg(&module)
        .arg("double")
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;

    assert!(stdout.starts_with("def conv_0(n, x):"));
    assert!(stdout.contains("tpl_0('body', 'N', locals())"));

    Ok(())
}

#[test]
fn test_exec() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let module = create_file(&dir, "module.pd", MODULE);

    cargo::cargo_bin_cmd!("pdc")
        .arg("exec")
        .arg(&module)
        .arg("double")
        .args(["--template-handler", "handler", "--arg", "3", "--arg", "7"])
        .assert()
        .success()
        .stdout("def __pdc_dynamic_func_0(n, x):\n    print(3 * x)\n21\nNone\n");

    Ok(())
}

#[rstest]
#[case::missing_function(vec!["sections", "{module}", "nope"], "Function not found: nope")]
#[case::missing_handler(
    vec!["exec", "{module}", "double", "--template-handler", "nope"],
    "Template handler not found: nope"
)]
#[case::missing_file(vec!["convert", "{dir}/absent.pd", "double"], "File not found")]
fn test_errors(#[case] args: Vec<&str>, #[case] expected: &str) -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let module = create_file(&dir, "module.pd", MODULE);
    let args = args.iter().map(|arg| {
        arg.replace("{module}", &module.to_string_lossy())
            .replace("{dir}", &dir.path().to_string_lossy())
    });

    let assert = cargo::cargo_bin_cmd!("pdc").args(args).assert().failure();
    let stderr = String::from_utf8(assert.get_output().stderr.clone())?;
    assert!(stderr.contains(expected), "stderr: {stderr}");

    Ok(())
}

#[test]
fn test_authoring_error_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let module = create_file(
        &dir,
        "broken.pd",
        "def f():\n    # PDC-Function\n    # PDC-Start a\n    x = 1\n    # PDC-End b\n",
    );

    let assert = cargo::cargo_bin_cmd!("pdc")
        .arg("sections")
        .arg(&module)
        .arg("f")
        .assert()
        .failure();
    let stderr = String::from_utf8(assert.get_output().stderr.clone())?;
    assert!(stderr.contains("pdc::structure::mismatched_end"), "stderr: {stderr}");

    Ok(())
}
