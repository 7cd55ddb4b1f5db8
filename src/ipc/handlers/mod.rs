pub mod attendance;
pub mod classes;
pub mod core;
pub mod dashboard;
pub mod holidays;
pub mod schedules;
pub mod students;
pub mod timetable;
pub mod users;
