//! Layout tests

use chrono::{Local, TimeZone};
use scribe_protocol::{Event, Level};

use super::*;

fn event() -> Event {
    Event::new(Level::Warn, "db.pool", "connection slow")
        .with_timestamp(Local.with_ymd_and_hms(2026, 6, 14, 15, 30, 12).single().unwrap())
        .with_property("attempt", 3)
}

#[test]
fn test_default_layout() {
    let rendered = Layout::default().render_to_string(&event());
    assert_eq!(rendered, "2026-06-14 15:30:12.000|WARN|db.pool|connection slow");
}

#[test]
fn test_message_with_exception() {
    let layout = Layout::parse("${message:withexception}").unwrap();
    let event = event().with_error("timeout after 5s");
    assert_eq!(layout.render_to_string(&event), "connection slow timeout after 5s");

    let plain = Layout::parse("${message}|${error}").unwrap();
    assert_eq!(plain.render_to_string(&event), "connection slow|timeout after 5s");
}

#[test]
fn test_properties_and_literals() {
    let layout = Layout::parse("[${level}] ${source} attempt=${property:attempt} missing=${property:none}${newline}")
        .unwrap();
    assert_eq!(
        layout.render_to_string(&event()),
        "[warn] db.pool attempt=3 missing=\n"
    );
}

#[test]
fn test_date_renderers() {
    let layout = Layout::parse("${shortdate} ${date} ${time}").unwrap();
    assert_eq!(
        layout.render_to_string(&event()),
        "2026-06-14 2026/06/14 15:30:12.000 15:30:12.000"
    );
}

#[test]
fn test_render_appends() {
    let layout = Layout::parse("${logger}").unwrap();
    let mut out = String::from("prefix:");
    layout.render(&event(), &mut out);
    assert_eq!(out, "prefix:db.pool");
}

#[test]
fn test_fixed_layout() {
    assert!(Layout::parse("logs/app.log").unwrap().is_fixed());
    assert!(Layout::parse("logs/app${newline}").unwrap().is_fixed());
    assert!(!Layout::parse("logs/${shortdate}.log").unwrap().is_fixed());
}

#[test]
fn test_parse_errors() {
    assert_eq!(
        Layout::parse("${nope}").unwrap_err(),
        LayoutError::UnknownRenderer("nope".into())
    );
    assert_eq!(
        Layout::parse("abc ${message").unwrap_err(),
        LayoutError::Unterminated(4)
    );
    assert!(Layout::parse("${property}").is_err());
}
