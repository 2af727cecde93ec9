//! Writes reports as JSON lines, one per accepted packet.
use std::collections::BTreeMap;
use std::io;

use gps_server::Report;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::config::DeviceMeta;

#[derive(Serialize)]
struct Line<'a> {
    #[serde(flatten)]
    report: &'a Report,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<&'a DeviceMeta>,
}

/// Drains `reports` into `out` until every sender is gone.
pub async fn publish<W: AsyncWrite + Unpin>(
    mut reports: mpsc::Receiver<Report>,
    meta: &BTreeMap<String, DeviceMeta>,
    out: &mut W,
) -> io::Result<()> {
    while let Some(report) = reports.recv().await {
        log::debug!("Publishing report of {}", report.mqtt_id());
        let line = Line {
            report: &report,
            meta: meta.get(report.device()),
        };
        let mut json = serde_json::to_vec(&line)?;
        json.push(b'\n');
        out.write_all(&json).await?;
        out.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use gps_protocol::watch::WatchDecoder;
    use gps_protocol::{DecoderOptions, FrameDecoder};

    fn report(frame: &[u8]) -> Report {
        let mut decoder = WatchDecoder::new(&DecoderOptions::default());
        let (packet, _) = decoder.decode_frame(frame).unwrap().unwrap();
        Report::new("watch", &packet)
    }

    #[tokio::test]
    async fn one_line_per_report() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(report(
            b"[3G*8800000015*003a*UD,220414,134652,A,22.571707,S,113.8613968,E,0.1,0.0,100,7,60,90]",
        ))
        .await
        .unwrap();
        tx.send(report(b"[SG*1*0003*TKQ]")).await.unwrap();
        drop(tx);

        let meta = BTreeMap::from([(
            "3G*8800000015".to_string(),
            DeviceMeta {
                name: Some("Watch".to_string()),
                icon: None,
            },
        )]);
        let mut out = Vec::new();
        publish(rx, &meta, &mut out).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);

        assert_eq!(lines[0]["protocol"], "watch");
        assert_eq!(lines[0]["mqtt_id"], "3G_8800000015");
        assert_eq!(lines[0]["device"], "3G*8800000015");
        assert_eq!(lines[0]["record"]["latitude"], -22.571707);
        assert_eq!(lines[0]["record"]["timestamp"], "2014-04-22T13:46:52+00:00");
        assert_eq!(lines[0]["meta"]["name"], "Watch");

        assert!(lines[1].get("record").is_none());
        assert!(lines[1].get("meta").is_none());
        assert_eq!(lines[1]["attributes"]["type"], "TK");
    }

    #[tokio::test]
    async fn write_failure_is_returned() {
        let (tx, rx) = mpsc::channel(1);
        tx.send(report(b"[SG*1*0003*TKQ]")).await.unwrap();
        drop(tx);

        let mut out = closed_pipe().await;
        assert!(publish(rx, &BTreeMap::new(), &mut out).await.is_err());
    }

    async fn closed_pipe() -> tokio::io::DuplexStream {
        let (writer, reader) = tokio::io::duplex(64);
        drop(reader);
        writer
    }
}
