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

/// Admin actor, a Monday class running Jan-Mar 2025, two enrolled students.
fn seed(sc: &mut Sidecar, workspace: &PathBuf) -> (String, Vec<String>) {
    sc.ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));
    let admin = created_id(sc.ok("users.create", json!({ "username": "admin", "role": "staff" })), "userId");
    sc.ok("session.setActor", json!({ "userId": admin }));
    let class_id = created_id(
        sc.ok(
            "classes.create",
            json!({ "name": "History 9", "startDate": "2025-01-01", "endDate": "2025-03-31" }),
        ),
        "classId",
    );
    sc.ok(
        "schedules.replace",
        json!({
            "classId": class_id,
            "entries": [{ "dayOfWeek": "Monday", "startTime": "11:00", "endTime": "12:00" }]
        }),
    );
    let mut students = Vec::new();
    for (number, last) in [("100", "Adams"), ("101", "Baker")] {
        let id = created_id(
            sc.ok(
                "students.create",
                json!({ "studentNumber": number, "lastName": last, "firstName": "Sam" }),
            ),
            "studentId",
        );
        sc.ok("enrollments.add", json!({ "classId": class_id, "studentId": id }));
        students.push(id);
    }
    (class_id, students)
}

fn strings(v: &serde_json::Value) -> Vec<String> {
    v.as_array()
        .expect("array")
        .iter()
        .map(|x| x.as_str().expect("string").to_string())
        .collect()
}

#[test]
fn session_dates_follow_the_weekly_schedule_and_class_window() {
    let workspace = temp_dir("attendanced-session-dates");
    let mut sc = Sidecar::spawn();
    let (class_id, _) = seed(&mut sc, &workspace);

    let feb = sc.ok("attendance.sessionDates", json!({ "classId": class_id, "year": 2025, "month": 2 }));
    assert_eq!(feb["scheduleKind"], json!("structured"));
    assert_eq!(
        strings(&feb["dates"]),
        vec!["2025-02-03", "2025-02-10", "2025-02-17", "2025-02-24"]
    );
    assert_eq!(feb["warnings"], json!([]));

    let march = sc.ok("attendance.sessionDates", json!({ "classId": class_id, "month": "2025-03" }));
    assert_eq!(strings(&march["dates"]).last().map(String::as_str), Some("2025-03-31"));
    assert_eq!(march["dates"].as_array().map(|a| a.len()), Some(5));

    let april = sc.ok("attendance.sessionDates", json!({ "classId": class_id, "month": "2025-04" }));
    assert_eq!(april["dates"], json!([]));

    let week = sc.ok("attendance.sessionDates", json!({ "classId": class_id, "weekOf": "2025-02-13" }));
    assert_eq!(strings(&week["dates"]), vec!["2025-02-10"]);

    sc.finish();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn legacy_descriptors_and_unscheduled_classes() {
    let workspace = temp_dir("attendanced-legacy-schedule");
    let mut sc = Sidecar::spawn();
    seed(&mut sc, &workspace);

    let legacy = created_id(
        sc.ok("classes.create", json!({ "name": "Art", "scheduleDetails": "Wed 10:00 Room 4" })),
        "classId",
    );
    let dates = sc.ok("attendance.sessionDates", json!({ "classId": legacy, "month": "2025-02" }));
    assert_eq!(dates["scheduleKind"], json!("legacyText"));
    assert_eq!(
        strings(&dates["dates"]),
        vec!["2025-02-05", "2025-02-12", "2025-02-19", "2025-02-26"]
    );

    let bare = created_id(sc.ok("classes.create", json!({ "name": "Study hall" })), "classId");
    let dates = sc.ok("attendance.sessionDates", json!({ "classId": bare, "month": "2025-02" }));
    assert_eq!(dates["scheduleKind"], json!("none"));
    assert_eq!(dates["dates"], json!([]));

    sc.finish();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn holidays_fill_unmarked_cells_and_explicit_marks_win() {
    let workspace = temp_dir("attendanced-matrix-holidays");
    let mut sc = Sidecar::spawn();
    let (class_id, students) = seed(&mut sc, &workspace);

    sc.ok(
        "holidays.upsert",
        json!({ "date": "2025-02-17", "type": "Public Holiday", "name": "Founders Day" }),
    );
    sc.ok(
        "holidays.upsert",
        json!({ "date": "2025-02-24", "type": "School Event", "name": "Sports carnival" }),
    );
    sc.ok(
        "attendance.mark",
        json!({
            "classId": class_id,
            "date": "2025-02-17",
            "entries": [{ "studentId": students[0], "status": "present" }]
        }),
    );

    let m = sc.ok("attendance.monthMatrix", json!({ "classId": class_id, "year": 2025, "month": 2 }));
    assert_eq!(m["cellCount"], json!(8));
    let rows = m["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(strings(&rows[0]["statuses"]), vec!["", "", "present", ""]);
    assert_eq!(
        strings(&rows[0]["sources"]),
        vec!["unmarked", "unmarked", "recorded", "unmarked"]
    );
    assert_eq!(strings(&rows[1]["statuses"]), vec!["", "", "public_holiday", ""]);
    assert_eq!(rows[1]["sources"][2], json!("holiday"));
    // A school event annotates the date but supplies no status.
    assert_eq!(m["holidays"].as_array().map(|a| a.len()), Some(2));
    assert_eq!(m["dates"].as_array().map(|a| a.len()), Some(4));

    sc.finish();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn marking_every_cell_absent_reads_back_as_absent() {
    let workspace = temp_dir("attendanced-matrix-roundtrip");
    let mut sc = Sidecar::spawn();
    let (class_id, students) = seed(&mut sc, &workspace);
    sc.ok(
        "holidays.upsert",
        json!({ "date": "2025-03-10", "type": "School Holiday", "name": "Term break" }),
    );

    let dates = strings(
        &sc.ok("attendance.sessionDates", json!({ "classId": class_id, "month": "2025-03" }))["dates"],
    );
    for date in &dates {
        let entries: Vec<_> = students
            .iter()
            .map(|id| json!({ "studentId": id, "status": "absent" }))
            .collect();
        sc.ok(
            "attendance.mark",
            json!({ "classId": class_id, "date": date, "entries": entries }),
        );
    }

    let m = sc.ok("attendance.monthMatrix", json!({ "classId": class_id, "month": "2025-03" }));
    assert_eq!(m["cellCount"], json!(students.len() * dates.len()));
    for row in m["rows"].as_array().expect("rows") {
        assert!(strings(&row["statuses"]).iter().all(|s| s == "absent"), "{}", row);
    }

    let summary = sc.ok(
        "attendance.summary",
        json!({ "classId": class_id, "from": "2025-03-01", "to": "2025-03-16" }),
    );
    assert_eq!(summary["uniqueSessionDates"], json!(2));
    assert_eq!(summary["students"][0]["attendanceRate"], json!(0.0));

    sc.finish();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn out_of_range_calendar_inputs_are_clamped_with_warnings() {
    let workspace = temp_dir("attendanced-matrix-clamp");
    let mut sc = Sidecar::spawn();
    let (class_id, _) = seed(&mut sc, &workspace);

    let m = sc.ok("attendance.monthMatrix", json!({ "classId": class_id, "year": 2025, "month": 13 }));
    assert_eq!(m["warnings"].as_array().map(|a| a.len()), Some(1));
    let m = sc.ok("attendance.monthMatrix", json!({ "classId": class_id, "year": 1850, "month": 2 }));
    assert_eq!(m["warnings"].as_array().map(|a| a.len()), Some(1));
    let m = sc.ok("attendance.sessionDates", json!({ "classId": class_id, "month": "2025-xx" }));
    assert!(!m["warnings"].as_array().expect("warnings").is_empty());

    let sheet = sc.ok("attendance.daySheet", json!({ "classId": class_id, "date": "2025-02-11" }));
    assert!(!sheet["warnings"].as_array().expect("warnings").is_empty());
    let sheet = sc.ok("attendance.daySheet", json!({ "classId": class_id, "date": "11/02/2025" }));
    assert!(!sheet["warnings"].as_array().expect("warnings").is_empty());

    sc.finish();
    let _ = std::fs::remove_dir_all(workspace);
}
