/// Byte accounting for one upload submission.
///
/// A fresh task starts at 0% so each submission reports its own sequence;
/// the reported percent never goes backwards.
#[derive(Debug, Clone)]
pub struct UploadTask {
    total_bytes: u64,
    bytes_sent: u64,
    reported: Option<u8>,
}

impl UploadTask {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            bytes_sent: 0,
            reported: None,
        }
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 0;
        }
        let sent = self.bytes_sent.min(self.total_bytes) as f64;
        (sent / self.total_bytes as f64 * 100.0).round() as u8
    }

    /// The first report of a submission: always 0.
    pub fn start(&mut self) -> u8 {
        self.reported = Some(0);
        0
    }

    /// Record `len` more bytes on the wire. Returns the percent to report
    /// when it moved forward.
    pub fn advance(&mut self, len: u64) -> Option<u8> {
        self.bytes_sent = self.bytes_sent.saturating_add(len);
        self.report(self.percent())
    }

    /// The server accepted the body; everything was sent.
    pub fn finish(&mut self) -> Option<u8> {
        self.bytes_sent = self.total_bytes;
        self.report(100)
    }

    fn report(&mut self, percent: u8) -> Option<u8> {
        match self.reported {
            Some(last) if percent <= last => None,
            _ => {
                self.reported = Some(percent);
                Some(percent)
            }
        }
    }
}
