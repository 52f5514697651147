//! Core traits for probe socket implementations.

use crate::{ProbeReply, ProbeRequest, SentProbe, TracerouteError};

/// Sends typed probe requests and waits for their correlated replies.
///
/// The sweep engine only talks to this trait, so it can run against a real
/// raw socket or a simulated path.
pub trait ProbeSocket {
    /// Transmits `request`, stamping the send time immediately before the
    /// packet is handed to the operating system.
    ///
    /// An `Err` means the probe never left the host.
    fn send_probe(&mut self, request: &ProbeRequest) -> Result<SentProbe, TracerouteError>;

    /// Waits for the reply matching `sent` until its deadline.
    ///
    /// Unrelated or undecodable packets are skipped. Returns
    /// `Err(TracerouteError::ReadTimeout)` when the deadline passes first.
    fn receive_probe(&mut self, sent: &SentProbe) -> Result<ProbeReply, TracerouteError>;

    /// Closes the socket, releasing resources.
    fn close(&mut self) -> Result<(), TracerouteError>;

    /// Sends `request` and waits for its reply.
    fn probe(&mut self, request: &ProbeRequest) -> Result<(SentProbe, ProbeReply), TracerouteError> {
        let sent = self.send_probe(request)?;
        let reply = self.receive_probe(&sent)?;
        Ok((sent, reply))
    }
}

impl<S: ProbeSocket + ?Sized> ProbeSocket for Box<S> {
    fn send_probe(&mut self, request: &ProbeRequest) -> Result<SentProbe, TracerouteError> {
        (**self).send_probe(request)
    }

    fn receive_probe(&mut self, sent: &SentProbe) -> Result<ProbeReply, TracerouteError> {
        (**self).receive_probe(sent)
    }

    fn close(&mut self) -> Result<(), TracerouteError> {
        (**self).close()
    }
}
