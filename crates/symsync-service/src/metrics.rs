//! Statsd reporting for cache and sync operations.
//!
//! Nothing is sent until [`configure_statsd`] installs a reporter. Until then every
//! [`metric!`](crate::metric) invocation is a no-op.
use std::collections::BTreeMap;
use std::io;
use std::net::{ToSocketAddrs, UdpSocket};
use std::sync::OnceLock;

use cadence::{Metric, MetricBuilder, StatsdClient, UdpMetricSink};

static REPORTER: OnceLock<StatsdReporter> = OnceLock::new();

/// The metrics prelude that is necessary to use the client.
pub mod prelude {
    pub use cadence::prelude::*;
}

/// A statsd client that attaches the configured tags to every metric.
#[derive(Debug)]
pub struct StatsdReporter {
    client: StatsdClient,
    tags: BTreeMap<String, String>,
}

impl StatsdReporter {
    /// The underlying statsd client, used to build metrics.
    pub fn client(&self) -> &StatsdClient {
        &self.client
    }

    /// Adds the configured tags to `metric` and sends it.
    pub fn send<'a, T>(&'a self, metric: MetricBuilder<'a, '_, T>)
    where
        T: Metric + From<String>,
    {
        self.tags
            .iter()
            .fold(metric, |metric, (tag, value)| metric.with_tag(tag, value))
            .send()
    }
}

/// Reports all metrics to the statsd server at `host`, prefixed by `prefix`.
///
/// Only the first call installs a reporter.
pub fn configure_statsd<A: ToSocketAddrs>(
    prefix: &str,
    host: A,
    tags: BTreeMap<String, String>,
) -> io::Result<()> {
    let addrs: Vec<_> = host.to_socket_addrs()?.collect();
    let Some(addr) = addrs.first() else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "statsd host did not resolve",
        ));
    };
    tracing::info!("Reporting metrics to statsd at {}", addr);

    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_nonblocking(true)?;
    let sink = UdpMetricSink::from(&addrs[..], socket).map_err(io::Error::other)?;

    let reporter = StatsdReporter {
        client: StatsdClient::from_sink(prefix, sink),
        tags,
    };
    if REPORTER.set(reporter).is_err() {
        tracing::warn!("statsd reporting was already configured");
    }
    Ok(())
}

/// Runs `f` with the installed reporter, if any.
///
/// Use the [`metric!`](crate::metric) macro instead of calling this directly.
#[inline(always)]
pub fn with_reporter<F>(f: F)
where
    F: FnOnce(&StatsdReporter),
{
    if let Some(reporter) = REPORTER.get() {
        f(reporter)
    }
}

/// Emits a counter, gauge or timer.
///
/// ```ignore
/// metric!(counter("pdb_cache.hit") += 1);
/// metric!(gauge("pdb_cache.size_gb") = size, "root" => "d");
/// metric!(timer("sync.duration") = start.elapsed());
/// ```
#[macro_export]
macro_rules! metric {
    (counter($id:expr) += $value:expr $(, $k:expr => $v:expr)* $(,)?) => {
        $crate::metric!(@send count_with_tags, $id, $value $(, $k => $v)*)
    };
    (gauge($id:expr) = $value:expr $(, $k:expr => $v:expr)* $(,)?) => {
        $crate::metric!(@send gauge_with_tags, $id, $value $(, $k => $v)*)
    };
    (timer($id:expr) = $value:expr $(, $k:expr => $v:expr)* $(,)?) => {
        $crate::metric!(@send time_with_tags, $id, $value $(, $k => $v)*)
    };
    (@send $method:ident, $id:expr, $value:expr $(, $k:expr => $v:expr)*) => {{
        use $crate::metrics::prelude::*;
        $crate::metrics::with_reporter(|reporter| {
            reporter.send(reporter.client().$method($id, $value) $(.with_tag($k, $v))*);
        })
    }};
}
