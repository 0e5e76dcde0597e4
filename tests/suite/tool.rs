//! `mender tool` end to end: one dispatch, JSON on stdout, exit code from `is_error`.

use crate::common::{Sandbox, stdout_json};

#[test]
fn successful_tool_exits_zero() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&[
        "tool",
        "create_files",
        "--input",
        r#"{"files": {"path": "src/app.py", "content": "print('hi')\n"}}"#,
    ]);

    assert!(output.status.success());
    let result = stdout_json(&output);
    assert_eq!(result["is_error"], false);
    assert_eq!(result["content"], "File created and cached: src/app.py");
    assert_eq!(sandbox.read("src/app.py"), "print('hi')\n");
}

#[test]
fn unknown_tool_exits_one() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["tool", "tavily_search", "--input", "{}"]);

    assert_eq!(output.status.code(), Some(1));
    let result = stdout_json(&output);
    assert_eq!(result["is_error"], true);
    assert_eq!(result["content"], "Unknown tool: tavily_search");
}

#[test]
fn input_can_come_from_a_file() {
    let sandbox = Sandbox::new();
    sandbox.write("notes.txt", "todo: ship\n");
    sandbox.write("input.json", r#"{"query": "ship"}"#);
    let output = sandbox.run(&["tool", "search", "--input-file", "input.json"]);

    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["content"], "notes.txt:1: todo: ship");
}

#[test]
fn logs_stay_out_of_stdout() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["tool", "list_files"]);

    assert!(output.status.success());
    stdout_json(&output);
    assert!(sandbox.logs_dir().join("mender.log").exists());
}

#[test]
fn broken_config_falls_back_to_defaults() {
    let sandbox = Sandbox::new();
    sandbox.write_config("[edit\nnot toml");
    sandbox.write("a.txt", "x = 1\n");
    let output = sandbox.run(&[
        "tool",
        "edit_and_apply_multiple",
        "--input",
        r#"{"files": {"path": "a.txt", "instructions": "<SEARCH>x = 1</SEARCH><REPLACE>x = 2</REPLACE>"}}"#,
    ]);

    assert!(output.status.success());
    assert_eq!(sandbox.read("a.txt"), "x = 2\n");
}
