use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_attendanced");
        let mut child = Command::new(exe)
            .env_remove("ATTENDANCED_WORKSPACE")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn attendanced");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    fn call(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({ "id": id, "method": method, "params": params });
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.call(method, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value["result"].clone()
    }

    fn error(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.call(method, params);
        assert_eq!(value["ok"], json!(false), "{} unexpectedly succeeded: {}", method, value);
        value["error"].clone()
    }

    fn finish(mut self) {
        drop(self.stdin);
        let _ = self.child.wait();
    }
}


fn created_id(result: serde_json::Value, key: &str) -> String {
    result[key].as_str().expect("created id").to_string()
}

fn open_as_admin(sc: &mut Sidecar, workspace: &PathBuf) -> String {
    sc.ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));
    let admin = created_id(sc.ok("users.create", json!({ "username": "admin", "role": "admin" })), "userId");
    sc.ok("session.setActor", json!({ "userId": admin }));
    admin
}

fn entry(day: &str, start: &str, end: &str) -> serde_json::Value {
    json!({ "dayOfWeek": day, "startTime": start, "endTime": end })
}

#[test]
fn inverted_and_overlapping_entries_are_rejected() {
    let workspace = temp_dir("attendanced-schedule-validation");
    let mut sc = Sidecar::spawn();
    open_as_admin(&mut sc, &workspace);
    let class_id = created_id(sc.ok("classes.create", json!({ "name": "Chemistry" })), "classId");

    let e = sc.error(
        "schedules.replace",
        json!({ "classId": class_id, "entries": [entry("Tuesday", "10:00", "10:00")] }),
    );
    assert_eq!(e["code"], json!("validation"));
    assert_eq!(e["details"]["field"], json!("entries[0].endTime"));

    let e = sc.error(
        "schedules.replace",
        json!({
            "classId": class_id,
            "entries": [entry("Tuesday", "09:00", "10:30"), entry("tue", "10:00", "11:00")]
        }),
    );
    assert_eq!(e["details"]["field"], json!("entries[1]"));
    assert!(e["message"].as_str().unwrap_or("").starts_with("overlapping_schedule"));

    let e = sc.error(
        "schedules.replace",
        json!({ "classId": class_id, "entries": [entry("Someday", "09:00", "10:00")] }),
    );
    assert_eq!(e["details"]["field"], json!("entries[0].dayOfWeek"));

    // Nothing above may have been saved.
    let listed = sc.ok("schedules.list", json!({ "classId": class_id }));
    assert_eq!(listed["entries"], json!([]));
    assert_eq!(listed["scheduleKind"], json!("none"));

    // Touching intervals are fine.
    let saved = sc.ok(
        "schedules.replace",
        json!({
            "classId": class_id,
            "entries": [entry("Tuesday", "09:00", "10:00"), entry("Tuesday", "10:00", "11:00")]
        }),
    );
    assert_eq!(saved["entries"].as_array().map(|a| a.len()), Some(2));

    sc.finish();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn replacing_the_list_keeps_updates_and_drops_missing_ids() {
    let workspace = temp_dir("attendanced-schedule-replace");
    let mut sc = Sidecar::spawn();
    open_as_admin(&mut sc, &workspace);
    let class_id = created_id(sc.ok("classes.create", json!({ "name": "Biology" })), "classId");

    let first = sc.ok(
        "schedules.replace",
        json!({
            "classId": class_id,
            "entries": [entry("Monday", "09:00", "10:00"), entry("Thursday", "13:00", "14:00")]
        }),
    );
    let monday_id = first["entries"][0]["id"].as_str().expect("id").to_string();

    let mut moved = entry("Monday", "08:30", "09:30");
    moved["id"] = json!(monday_id);
    moved["location"] = json!("Lab 2");
    let second = sc.ok(
        "schedules.replace",
        json!({ "classId": class_id, "entries": [moved, entry("Friday", "09:00", "10:00")] }),
    );
    let entries = second["entries"].as_array().expect("entries");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["id"], json!(monday_id));
    assert_eq!(entries[0]["startTime"], json!("08:30"));
    assert_eq!(entries[0]["location"], json!("Lab 2"));
    assert_eq!(entries[1]["dayOfWeek"], json!("Friday"));

    // An id from another class is refused.
    let other = created_id(sc.ok("classes.create", json!({ "name": "Physics" })), "classId");
    let mut foreign = entry("Monday", "09:00", "10:00");
    foreign["id"] = json!(monday_id);
    let e = sc.error("schedules.replace", json!({ "classId": other, "entries": [foreign] }));
    assert_eq!(e["code"], json!("validation"));

    let cleared = sc.ok("schedules.replace", json!({ "classId": class_id, "entries": [] }));
    assert_eq!(cleared["entries"], json!([]));

    sc.finish();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn deleting_a_class_without_facts_removes_its_schedule() {
    let workspace = temp_dir("attendanced-schedule-cascade");
    let mut sc = Sidecar::spawn();
    open_as_admin(&mut sc, &workspace);
    let class_id = created_id(sc.ok("classes.create", json!({ "name": "Drama" })), "classId");
    sc.ok(
        "schedules.replace",
        json!({ "classId": class_id, "entries": [entry("Wednesday", "14:00", "15:00")] }),
    );
    sc.ok("classes.delete", json!({ "classId": class_id }));
    let e = sc.error("schedules.list", json!({ "classId": class_id }));
    assert_eq!(e["code"], json!("not_found"));

    sc.finish();
    let _ = std::fs::remove_dir_all(workspace);
}
