//! `mender session` end to end: JSON lines in, one result line out per request.

use mender_types::ToolResult;

use crate::common::Sandbox;

fn results(stdout: &[u8]) -> Vec<ToolResult> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
fn requests_share_one_session() {
    let sandbox = Sandbox::new();
    sandbox.write("cfg.ini", "level = low\n");
    let requests = [
        r#"{"name": "read_multiple_files", "input": {"paths": ["cfg.ini"]}}"#,
        r#"{"name": "edit_and_apply_multiple", "input": {"files": [{"path": "cfg.ini", "instructions": "<SEARCH>level = low</SEARCH><REPLACE>level = high</REPLACE>"}]}}"#,
        r#"{"name": "read_multiple_files", "input": {"paths": "cfg.ini"}}"#,
        r#"{"name": "stop_process", "input": {}}"#,
    ]
    .join("\n");

    let output = sandbox.run_with_stdin(&["session"], &requests);
    assert!(output.status.success());

    let results = results(&output.stdout);
    assert_eq!(results.len(), 4);
    assert!(!results[0].is_error);
    assert_eq!(results[1].content[0]["status"], "success");
    assert_eq!(
        results[2].content_text(),
        "All requested files are already cached. No need to read from disk."
    );
    assert!(results[3].is_error);
    assert_eq!(
        results[3].content_text(),
        "Error: Missing required parameter 'process_id' for tool stop_process"
    );
    assert_eq!(sandbox.read("cfg.ini"), "level = high\n");
}

#[cfg(unix)]
#[test]
fn detached_process_can_be_stopped_from_a_later_line() {
    let sandbox = Sandbox::new();
    sandbox.write_config("[exec]\ninterpreter = \"sh\"\nextension = \"sh\"\n");
    let requests = [
        r#"{"name": "execute_code", "input": {"code": "sleep 5", "timeout_secs": 0.2}}"#,
        r#"{"name": "stop_process", "input": {"process_id": "process_0"}}"#,
        r#"{"name": "stop_process", "input": {"process_id": "process_0"}}"#,
    ]
    .join("\n");

    let output = sandbox.run_with_stdin(&["session"], &requests);
    assert!(output.status.success());

    let results = results(&output.stdout);
    assert!(results[0].content_text().contains("Return Code: Running"));
    assert_eq!(results[1].content_text(), "Process process_0 has been stopped.");
    assert_eq!(
        results[2].content_text(),
        "No running process found with ID process_0."
    );
}
