use mqbench_core::{ClientResult, TotalResult};
use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human readable summary.
    #[default]
    Text,
    /// The full JSON document.
    Json,
}

/// Everything a run produced: one entry per client plus the fleet totals.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub runs: Vec<ClientResult>,
    pub totals: TotalResult,
}

impl Report {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_json_file(&self, path: &Path) -> Result<(), crate::RuntimeError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn print(&self, format: OutputFormat, w: &mut impl Write) -> Result<(), crate::RuntimeError> {
        match format {
            OutputFormat::Text => self.write_summary(w)?,
            OutputFormat::Json => writeln!(w, "{}", self.to_json()?)?,
        }
        Ok(())
    }

    pub fn write_summary(&self, w: &mut impl Write) -> io::Result<()> {
        let t = &self.totals;
        writeln!(w, "========= TEST PARAMS =========")?;
        writeln!(w, "Test Run Id:                      {}", t.run_id)?;
        writeln!(w, "Test Instance:                    {}", t.instance)?;
        writeln!(w, "Test Type:                        {}", t.mode)?;
        writeln!(w, "Number of Clients:                {}", t.clients)?;
        writeln!(w, "Number of Topics:                 {}", t.topics)?;
        if t.messages > 0 {
            writeln!(w, "Messages per Client:              {}", t.messages)?;
        }
        writeln!(w, "Message size (bytes):             {}", t.message_size)?;
        writeln!(w, "QoS:                              {}", t.qos)?;
        writeln!(w, "DOP (Max threads):                {}", t.parallelism)?;
        writeln!(w, "========= TEST RESULTS =========")?;
        writeln!(
            w,
            "Total Ratio:                      {:.3} ({}/{})",
            t.ratio,
            t.successes,
            t.successes + t.failures
        )?;
        writeln!(w, "Total Runtime (sec):              {:.3}", t.total_run_time)?;
        writeln!(w, "Client Runtime Avg (sec):         {:.3}", t.client_run_time_mean)?;
        writeln!(w, "Client Runtime Min (sec):         {:.3}", t.client_run_time_min)?;
        writeln!(w, "Client Runtime Max (sec):         {:.3}", t.client_run_time_max)?;
        writeln!(w, "Client Runtime Std (sec):         {:.3}", t.client_run_time_std)?;
        writeln!(w, "Messages per Client Avg:          {:.3}", t.msg_per_client_mean)?;
        writeln!(w, "Messages per Client Min:          {:.3}", t.msg_per_client_min)?;
        writeln!(w, "Messages per Client Max:          {:.3}", t.msg_per_client_max)?;
        writeln!(w, "Messages per Client Std:          {:.3}", t.msg_per_client_std)?;
        writeln!(w, "Msg Latency Avg (ms):             {:.3}", t.msg_time_mean)?;
        writeln!(w, "Msg Latency Min (ms):             {:.3}", t.msg_time_min)?;
        writeln!(w, "Msg Latency Max (ms):             {:.3}", t.msg_time_max)?;
        writeln!(w, "Msg Latency Std (ms):             {:.3}", t.msg_time_std)?;
        writeln!(w, "Avg Bandwidth p/client (msg/sec): {:.3}", t.avg_msgs_per_sec)?;
        writeln!(w, "Total Test Bandwidth (msg/sec):   {:.3}", t.total_msgs_per_sec)?;
        writeln!(w, "==============================")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mqbench_core::{Mode, StopReason};

    fn report() -> Report {
        let run = ClientResult {
            successes: 99,
            failures: 1,
            run_time: 2.,
            msg_time_mean: 1.5,
            ..ClientResult::new("sub-0", StopReason::Idle)
        };
        let totals = TotalResult {
            run_id: "run-7".to_string(),
            instance: "bench-host".to_string(),
            mode: Mode::Subscribe,
            clients: 1,
            topics: 1,
            messages: 0,
            message_size: 100,
            parallelism: 2,
            qos: 1,
            ratio: 0.99,
            successes: 99,
            failures: 1,
            total_run_time: 2.,
            client_run_time_min: 2.,
            client_run_time_max: 2.,
            client_run_time_mean: 2.,
            client_run_time_std: 0.,
            msg_per_client_min: 100.,
            msg_per_client_max: 100.,
            msg_per_client_mean: 100.,
            msg_per_client_std: 0.,
            msg_time_min: 1.5,
            msg_time_max: 1.5,
            msg_time_mean: 1.5,
            msg_time_std: 0.,
            total_msgs_per_sec: 49.5,
            avg_msgs_per_sec: 49.5,
        };
        Report {
            runs: vec![run],
            totals,
        }
    }

    #[test]
    fn summary_table() {
        let mut out = Vec::new();
        report().write_summary(&mut out).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(out.contains("Test Type:                        sub\n"));
        assert!(out.contains("Total Ratio:                      0.990 (99/100)\n"));
        assert!(out.contains("Total Test Bandwidth (msg/sec):   49.500\n"));
        assert!(out.contains("DOP (Max threads):                2\n"));
        // Unbounded runs have no per-client message count.
        assert!(!out.contains("Messages per Client:"));
    }

    #[test]
    fn json_document_uses_report_field_names() {
        let json: serde_json::Value = serde_json::from_str(&report().to_json().unwrap()).unwrap();

        assert_eq!(json["runs"][0]["id"], "sub-0");
        assert_eq!(json["runs"][0]["run_time"], 2.);
        assert_eq!(json["runs"][0]["stop_reason"], "idle");
        assert_eq!(json["totals"]["run_instance"], "bench-host");
        assert_eq!(json["totals"]["run_type"], "sub");
        assert_eq!(json["totals"]["num_clients"], 1);
        assert_eq!(json["totals"]["dop"], 2);
        assert_eq!(json["totals"]["msg_time_mean_mean"], 1.5);
        assert_eq!(json["totals"]["msg_time_mean_std"], 0.);
    }

    #[test]
    fn writes_json_file() {
        let path = std::env::temp_dir().join(format!("mqbench-report-{}.json", std::process::id()));
        report().write_json_file(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["totals"]["run_id"], "run-7");
        std::fs::remove_file(path).unwrap();
    }
}
