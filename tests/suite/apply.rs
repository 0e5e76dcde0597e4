//! `mender apply` end to end.

use crate::common::{Sandbox, stdout_json};

const EDITS: &str = "\
<SEARCH>
def total(items):
    return sum(items)
</SEARCH>
<REPLACE>
def total(items, tax=0.0):
    return sum(items) * (1 + tax)
</REPLACE>
";

#[test]
fn apply_edits_then_reapply_is_a_no_op() {
    let sandbox = Sandbox::new();
    sandbox.write("calc.py", "def total(items):\n    return sum(items)\n");
    sandbox.write("edits.txt", EDITS);

    let first = sandbox.run(&["apply", "calc.py", "edits.txt"]);
    assert!(first.status.success());
    assert_eq!(stdout_json(&first)["status"], "success");
    let after = sandbox.read("calc.py");
    assert_eq!(
        after,
        "def total(items, tax=0.0):\n    return sum(items) * (1 + tax)\n"
    );

    let second = sandbox.run(&["apply", "calc.py", "edits.txt"]);
    assert!(second.status.success());
    assert_eq!(stdout_json(&second)["status"], "no_changes");
    assert_eq!(sandbox.read("calc.py"), after);
}

#[test]
fn apply_to_missing_file_exits_one() {
    let sandbox = Sandbox::new();
    sandbox.write("edits.txt", EDITS);
    let output = sandbox.run(&["apply", "gone.py", "edits.txt"]);

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout_json(&output)["status"], "error");
}

#[test]
fn configured_cutoff_is_honored() {
    let sandbox = Sandbox::new();
    sandbox.write_config("[edit]\nfuzzy_cutoff = 0.99\n");
    sandbox.write("s.sh", "echo \"building release\"\n");
    sandbox.write(
        "edits.txt",
        "<SEARCH>echo 'building release'</SEARCH><REPLACE>echo done</REPLACE>",
    );

    let output = sandbox.run(&["apply", "s.sh", "edits.txt"]);
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["status"], "no_changes");
    assert_eq!(sandbox.read("s.sh"), "echo \"building release\"\n");
}
