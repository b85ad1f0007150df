//! Response scraping for the SOAP backend.
//!
//! Request envelopes are written by hand in `esxi`; this module pulls the
//! handful of values we care about back out of the host's responses without
//! modeling the vim type system.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{Result, VimError};
use crate::task::{TaskChange, TaskHandle, TaskState, UpdateBatch};

/// Escape a string for inclusion in element content.
pub fn escape(s: &str) -> String {
    quick_xml::escape::escape(s).into_owned()
}

/// Text content of the first element with the given local name.
pub fn first_text(xml: &str, tag: &str) -> Option<String> {
    all_texts(xml, tag).into_iter().next()
}

/// Text content of every element with the given local name.
pub fn all_texts(xml: &str, tag: &str) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    let mut out = Vec::new();
    let mut depth_inside = 0usize;
    let mut current = String::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if depth_inside > 0 {
                    depth_inside += 1;
                } else if e.local_name().as_ref() == tag.as_bytes() {
                    depth_inside = 1;
                    current.clear();
                }
            }
            Ok(Event::Text(t)) if depth_inside > 0 => {
                current.push_str(&t.unescape().unwrap_or_default());
            }
            Ok(Event::End(_)) if depth_inside > 0 => {
                depth_inside -= 1;
                if depth_inside == 0 {
                    out.push(std::mem::take(&mut current));
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }
    out
}

/// Texts of `inner` elements that appear within an `outer` element.
///
/// Used where a bare tag name is ambiguous, e.g. `<name>` occurs both as a
/// property name and inside each `<HostVirtualSwitch>`.
pub fn texts_within(xml: &str, outer: &str, inner: &str) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    let mut out = Vec::new();
    let mut outer_depth = 0usize;
    let mut in_inner = false;
    let mut current = String::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let local = e.local_name();
                if local.as_ref() == outer.as_bytes() {
                    outer_depth += 1;
                } else if outer_depth > 0 && !in_inner && local.as_ref() == inner.as_bytes() {
                    in_inner = true;
                    current.clear();
                }
            }
            Ok(Event::Text(t)) if in_inner => {
                current.push_str(&t.unescape().unwrap_or_default());
            }
            Ok(Event::End(e)) => {
                let local = e.local_name();
                if in_inner && local.as_ref() == inner.as_bytes() {
                    in_inner = false;
                    out.push(std::mem::take(&mut current));
                } else if local.as_ref() == outer.as_bytes() && outer_depth > 0 {
                    outer_depth -= 1;
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }
    out
}

/// The fault message of a SOAP fault response, if the response is one.
pub fn fault_message(xml: &str) -> Option<String> {
    if !xml.contains("Fault") {
        return None;
    }
    first_text(xml, "faultstring").or_else(|| first_text(xml, "localizedMessage"))
}

/// Parse a `WaitForUpdatesEx` response into an [`UpdateBatch`].
///
/// Per object set we track the task reference plus the latest state and
/// error detail seen across its change sets; `info` and `info.state` both
/// carry state, `info.error` carries the localized failure message.
pub fn parse_update_batch(xml: &str, method: &str) -> Result<UpdateBatch> {
    let version = first_text(xml, "version")
        .ok_or_else(|| VimError::parse(method, "response carried no update version"))?;

    let mut changes = Vec::new();
    let mut reader = Reader::from_str(xml);

    // Parser scope flags
    let mut in_object_set = false;
    let mut capture: Option<&'static str> = None;
    let mut change_name = String::new();

    // Accumulated per object set
    let mut task: Option<String> = None;
    let mut state: Option<TaskState> = None;
    let mut detail: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"objectSet" => {
                    in_object_set = true;
                    task = None;
                    state = None;
                    detail = None;
                }
                b"obj" if in_object_set => capture = Some("obj"),
                b"name" if in_object_set => {
                    change_name.clear();
                    capture = Some("name");
                }
                b"val" if in_object_set => capture = Some("val"),
                b"state" if in_object_set => capture = Some("state"),
                b"localizedMessage" if in_object_set => capture = Some("message"),
                _ => {}
            },
            Ok(Event::Text(t)) => {
                let text = t.unescape().unwrap_or_default().into_owned();
                match capture {
                    Some("obj") => task = Some(text),
                    Some("name") => change_name = text,
                    Some("val") if change_name == "info.state" => {
                        state = TaskState::parse(&text).or(state);
                    }
                    Some("state") => state = TaskState::parse(&text).or(state),
                    Some("message") => detail = Some(text),
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                match e.local_name().as_ref() {
                    b"obj" | b"name" | b"val" | b"state" | b"localizedMessage" => capture = None,
                    b"objectSet" => {
                        in_object_set = false;
                        if let (Some(id), Some(st)) = (task.take(), state) {
                            changes.push(TaskChange {
                                task: TaskHandle::new(id),
                                state: st,
                                detail: detail.take(),
                            });
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(VimError::parse(method, e.to_string())),
            _ => {}
        }
    }

    Ok(UpdateBatch { version, changes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_and_all_texts() {
        let xml = "<a><b>one</b><c><b>two</b></c></a>";
        assert_eq!(first_text(xml, "b").as_deref(), Some("one"));
        assert_eq!(all_texts(xml, "b"), vec!["one", "two"]);
        assert!(first_text(xml, "missing").is_none());
    }

    #[test]
    fn texts_within_scopes_to_outer_element() {
        let xml = "<r><name>networkInfo.vswitch</name>\
                   <HostVirtualSwitch><key>k</key><name>vSwitch0</name></HostVirtualSwitch>\
                   <HostVirtualSwitch><name>mgmt-sw</name></HostVirtualSwitch></r>";
        assert_eq!(
            texts_within(xml, "HostVirtualSwitch", "name"),
            vec!["vSwitch0", "mgmt-sw"]
        );
    }

    #[test]
    fn fault_message_prefers_faultstring() {
        let xml = "<soapenv:Fault xmlns:soapenv=\"s\"><faultstring>A general system error \
                   occurred</faultstring></soapenv:Fault>";
        assert_eq!(
            fault_message(xml).as_deref(),
            Some("A general system error occurred")
        );
        assert!(fault_message("<ok/>").is_none());
    }

    #[test]
    fn parses_update_batch_with_state_and_error() {
        let xml = "<returnval><version>7</version><filterSet><filter>f-1</filter>\
          <objectSet><kind>modify</kind><obj type=\"Task\">haTask-1</obj>\
            <changeSet><name>info.state</name><op>assign</op><val>success</val></changeSet>\
          </objectSet>\
          <objectSet><kind>modify</kind><obj type=\"Task\">haTask-2</obj>\
            <changeSet><name>info.state</name><op>assign</op><val>error</val></changeSet>\
            <changeSet><name>info.error</name><op>assign</op>\
              <val><localizedMessage>insufficient resources</localizedMessage></val></changeSet>\
          </objectSet></filterSet></returnval>";
        let batch = parse_update_batch(xml, "WaitForUpdatesEx").unwrap();
        assert_eq!(batch.version, "7");
        assert_eq!(batch.changes.len(), 2);
        assert_eq!(batch.changes[0].task.id(), "haTask-1");
        assert_eq!(batch.changes[0].state, TaskState::Success);
        assert_eq!(batch.changes[1].state, TaskState::Error);
        assert_eq!(
            batch.changes[1].detail.as_deref(),
            Some("insufficient resources")
        );
    }

    #[test]
    fn parses_state_nested_in_info_val() {
        let xml = "<returnval><version>2</version><filterSet><objectSet>\
          <obj type=\"Task\">haTask-9</obj>\
          <changeSet><name>info</name><op>assign</op>\
            <val><key>haTask-9</key><state>running</state></val></changeSet>\
          </objectSet></filterSet></returnval>";
        let batch = parse_update_batch(xml, "WaitForUpdatesEx").unwrap();
        assert_eq!(batch.changes.len(), 1);
        assert_eq!(batch.changes[0].state, TaskState::Running);
    }

    #[test]
    fn update_batch_without_version_is_an_error() {
        assert!(parse_update_batch("<returnval/>", "WaitForUpdatesEx").is_err());
    }
}
