//! JUnit XML export
//!
//! Each protocol section becomes a `<testsuite>` and each check a
//! `<testcase>`, so CI systems that only understand JUnit can display
//! WvTest results.

use std::io::Write;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesText, Event};

use crate::aggregate::PREAMBLE_SOURCE;
use crate::classify::{ClassifiedEvent, Outcome};
use crate::error::ProtocolError;

/// One check within a suite
#[derive(Debug, Clone, PartialEq)]
pub struct Testcase {
    pub name: String,
    pub time: Duration,
    pub passed: bool,
}

/// One protocol section
#[derive(Debug, Clone, PartialEq)]
pub struct Testsuite {
    pub name: String,
    pub time: Duration,
    pub timestamp: DateTime<Local>,
    pub testcases: Vec<Testcase>,
    pub system_out: String,
}

impl Testsuite {
    #[must_use]
    pub fn failures(&self) -> usize {
        self.testcases.iter().filter(|t| !t.passed).count()
    }
}

#[derive(Debug)]
struct OpenSuite {
    suite: Testsuite,
    started: Instant,
    last_check: Option<Instant>,
}

/// Builds a [`JunitReport`] from a stream of classified lines
#[derive(Debug)]
pub struct JunitRecorder {
    prefix: String,
    label: String,
    current: Option<OpenSuite>,
    suites: Vec<Testsuite>,
}

impl JunitRecorder {
    /// `prefix` is prepended to every suite name; `label` names the
    /// implicit suite for output preceding the first banner
    #[must_use]
    pub fn new(prefix: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            label: label.into(),
            current: None,
            suites: Vec::new(),
        }
    }

    /// Record one line and its classification
    pub fn observe(&mut self, raw: &str, event: &ClassifiedEvent) {
        match event {
            ClassifiedEvent::Banner {
                section, source, ..
            } => {
                self.close();
                self.open(section, source);
            }
            ClassifiedEvent::Plain { text } if text.is_empty() && self.current.is_none() => {
                return;
            }
            _ => {
                if self.current.is_none() {
                    let section = format!("Preamble of {}", self.label);
                    self.open(&section, PREAMBLE_SOURCE);
                }
            }
        }

        let Some(open) = self.current.as_mut() else {
            return;
        };
        open.suite.system_out.push_str(raw);
        open.suite.system_out.push('\n');

        if let ClassifiedEvent::Result {
            description,
            outcome,
            ..
        } = event
        {
            let now = Instant::now();
            let since = open.last_check.unwrap_or(open.started);
            open.last_check = Some(now);
            open.suite.testcases.push(Testcase {
                name: description.clone(),
                time: now.duration_since(since),
                passed: *outcome == Outcome::Pass,
            });
        }
    }

    /// Close the last suite and return the report
    #[must_use]
    pub fn finish(mut self) -> JunitReport {
        self.close();
        JunitReport {
            suites: self.suites,
        }
    }

    fn open(&mut self, section: &str, source: &str) {
        self.current = Some(OpenSuite {
            suite: Testsuite {
                name: format!("{}{}.{}", self.prefix, source.replace('.', "_"), section),
                time: Duration::ZERO,
                timestamp: Local::now(),
                testcases: Vec::new(),
                system_out: String::new(),
            },
            started: Instant::now(),
            last_check: None,
        });
    }

    fn close(&mut self) {
        if let Some(mut open) = self.current.take() {
            open.suite.time = open.started.elapsed();
            self.suites.push(open.suite);
        }
    }
}

/// A complete JUnit document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JunitReport {
    pub suites: Vec<Testsuite>,
}

impl JunitReport {
    /// Append the suites of another report
    pub fn merge(&mut self, other: JunitReport) {
        self.suites.extend(other.suites);
    }

    /// Serialize the report as indented XML
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if writing to `out` fails.
    pub fn write_to<W: Write>(&self, out: W) -> Result<(), ProtocolError> {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".to_string());

        let mut writer = Writer::new_with_indent(out, b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer
            .create_element("testsuites")
            .write_inner_content(|w| {
                for suite in &self.suites {
                    let tests = suite.testcases.len().to_string();
                    let failures = suite.failures().to_string();
                    let time = format!("{:.3}", suite.time.as_secs_f64());
                    let timestamp = suite.timestamp.format("%Y-%m-%dT%H:%M:%S").to_string();
                    w.create_element("testsuite")
                        .with_attribute(("name", suite.name.as_str()))
                        .with_attribute(("tests", tests.as_str()))
                        .with_attribute(("failures", failures.as_str()))
                        .with_attribute(("errors", "0"))
                        .with_attribute(("time", time.as_str()))
                        .with_attribute(("timestamp", timestamp.as_str()))
                        .with_attribute(("hostname", host.as_str()))
                        .write_inner_content(|w| {
                            for case in &suite.testcases {
                                let time = format!("{:.3}", case.time.as_secs_f64());
                                let element = w
                                    .create_element("testcase")
                                    .with_attribute(("classname", suite.name.as_str()))
                                    .with_attribute(("name", case.name.as_str()))
                                    .with_attribute(("time", time.as_str()));
                                if case.passed {
                                    element.write_empty()?;
                                } else {
                                    element.write_inner_content(|w| {
                                        w.create_element("failure")
                                            .with_attribute(("type", "WvTest check"))
                                            .with_attribute(("message", case.name.as_str()))
                                            .write_empty()?;
                                        Ok(())
                                    })?;
                                }
                            }
                            w.create_element("system-out")
                                .write_text_content(BytesText::new(&suite.system_out))?;
                            Ok(())
                        })?;
                }
                Ok(())
            })?;
        writer.into_inner().flush()?;
        Ok(())
    }

    /// Serialize the report into a string
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if serialization fails.
    pub fn to_xml(&self) -> Result<String, ProtocolError> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
