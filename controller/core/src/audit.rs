use crate::{engine::Request, Decision, DecisionEngine};
use parking_lot::Mutex;
use serde::Serialize;
use std::{io::Write, sync::Arc};

/// Writes a trace of each request and its decision to an optional sink.
///
/// The trace is best-effort: failures to serialize or write a record are
/// ignored and never change the decision.
#[derive(Clone)]
pub struct Audit<E> {
    inner: E,
    sink: Option<Sink>,
}

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

#[derive(Serialize)]
struct Record<'a> {
    request: &'a Request,
    decision: &'a Decision,
}

// === impl Audit ===

impl<E> Audit<E> {
    pub fn new(inner: E, sink: Option<Box<dyn Write + Send>>) -> Self {
        Self {
            inner,
            sink: sink.map(|w| Arc::new(Mutex::new(w))),
        }
    }
}

#[async_trait::async_trait]
impl<E> DecisionEngine for Audit<E>
where
    E: DecisionEngine + Send + Sync,
{
    async fn decide(&self, request: &Request) -> Decision {
        let decision = self.inner.decide(request).await;
        if let Some(sink) = self.sink.as_ref() {
            if let Ok(mut line) = serde_json::to_vec(&Record {
                request,
                decision: &decision,
            }) {
                line.push(b'\n');
                let mut sink = sink.lock();
                let _ = sink.write_all(&line).and_then(|()| sink.flush());
            }
        }
        decision
    }
}

impl<E: std::fmt::Debug> std::fmt::Debug for Audit<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Audit")
            .field("inner", &self.inner)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ObjectSource;
    use serde_json::value::RawValue;
    use std::io;

    #[derive(Debug)]
    struct Fixed(Decision);

    #[async_trait::async_trait]
    impl DecisionEngine for Fixed {
        async fn decide(&self, _: &Request) -> Decision {
            self.0.clone()
        }
    }

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::ErrorKind::BrokenPipe.into())
        }
    }

    fn request() -> Request {
        Request {
            uid: "uid-1".to_string(),
            operation: "CREATE".to_string(),
            object: ObjectSource::Inline(
                RawValue::from_string(r#"{"metadata":{"name":"cm"}}"#.to_string()).unwrap(),
            ),
            old_object: None,
        }
    }

    fn allowed() -> Decision {
        Decision::Allowed {
            message: "operation 'CREATE' is allowed".to_string(),
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn passthrough_without_sink() {
        let audit = Audit::new(Fixed(allowed()), None);
        assert_eq!(audit.decide(&request()).await, allowed());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn writes_one_record_per_decision() {
        let buf = Buffer::default();
        let audit = Audit::new(Fixed(allowed()), Some(Box::new(buf.clone())));
        assert_eq!(audit.decide(&request()).await, allowed());

        let out = String::from_utf8(buf.0.lock().clone()).unwrap();
        let lines = out.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 1);

        let record: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(
            record,
            serde_json::json!({
                "request": {
                    "uid": "uid-1",
                    "operation": "CREATE",
                    "object": { "inline": { "metadata": { "name": "cm" } } },
                },
                "decision": {
                    "result": "allowed",
                    "message": "operation 'CREATE' is allowed",
                },
            })
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn sink_failures_are_ignored() {
        let denied = Decision::Denied {
            message: "unknown operation 'PATCH'".to_string(),
            permitted: vec![],
        };
        let audit = Audit::new(Fixed(denied.clone()), Some(Box::new(Broken)));
        assert_eq!(audit.decide(&request()).await, denied);
    }
}
