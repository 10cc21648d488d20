pub mod process_due_alarms;
