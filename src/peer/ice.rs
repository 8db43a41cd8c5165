use crate::peer::types::IceCandidate;
use crate::peer::PeerLink;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Сколько кандидатов держим до remote description
pub const MAX_PENDING_CANDIDATES: usize = 128;

/// Кандидаты, полученные до установки remote description
#[derive(Debug, Default)]
pub struct PendingCandidates {
    queue: VecDeque<IceCandidate>,
}

impl PendingCandidates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ставит кандидат в очередь. Точные повторы и всё сверх
    /// [`MAX_PENDING_CANDIDATES`] отбрасываются; `false` если кандидат не принят.
    pub fn push(&mut self, candidate: IceCandidate) -> bool {
        if self.queue.contains(&candidate) {
            debug!("Duplicate pending candidate dropped: {}", candidate.candidate);
            return false;
        }
        if self.queue.len() >= MAX_PENDING_CANDIDATES {
            warn!("Pending candidate queue full, dropping {}", candidate.candidate);
            return false;
        }
        self.queue.push_back(candidate);
        true
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Применяет все отложенные кандидаты в порядке прихода.
    /// Возвращает число успешно добавленных.
    pub async fn flush<P: PeerLink + ?Sized>(&mut self, peer: &P) -> usize {
        let mut applied = 0;
        while let Some(candidate) = self.queue.pop_front() {
            debug!("Applying pending candidate: {}", candidate.candidate);
            match peer.add_ice_candidate(candidate).await {
                Ok(()) => applied += 1,
                Err(e) => warn!("Failed to apply pending candidate: {e}"),
            }
        }
        applied
    }
}

/// Тип кандидата из строки `candidate:... typ host ...`
pub fn candidate_type(candidate: &IceCandidate) -> Option<&str> {
    let mut parts = candidate.candidate.split_whitespace();
    while let Some(part) = parts.next() {
        if part == "typ" {
            return parts.next();
        }
    }
    None
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CandidateStats {
    pub host: usize,
    pub srflx: usize,
    pub relay: usize,
}

pub fn analyze_candidates<'a>(candidates: impl IntoIterator<Item = &'a IceCandidate>) -> CandidateStats {
    let mut stats = CandidateStats::default();
    for c in candidates {
        match candidate_type(c) {
            Some("host") => stats.host += 1,
            Some("srflx") | Some("prflx") => stats.srflx += 1,
            Some("relay") => stats.relay += 1,
            _ => {}
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(s: &str) -> IceCandidate {
        IceCandidate {
            candidate: s.to_string(),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        }
    }

    #[test]
    fn extracts_candidate_type() {
        let c = cand("candidate:1 1 udp 2122260223 10.0.0.2 50000 typ host generation 0");
        assert_eq!(candidate_type(&c), Some("host"));
        assert_eq!(candidate_type(&cand("garbage")), None);
    }

    #[test]
    fn counts_by_type() {
        let list = vec![
            cand("candidate:1 1 udp 1 10.0.0.2 5000 typ host"),
            cand("candidate:2 1 udp 1 1.2.3.4 5000 typ srflx raddr 10.0.0.2 rport 5000"),
            cand("candidate:3 1 udp 1 5.6.7.8 5000 typ relay"),
            cand("candidate:4 1 udp 1 10.0.0.3 5000 typ host"),
        ];
        let stats = analyze_candidates(&list);
        assert_eq!(
            stats,
            CandidateStats {
                host: 2,
                srflx: 1,
                relay: 1
            }
        );
    }

    #[test]
    fn queue_keeps_arrival_order() {
        let mut pending = PendingCandidates::new();
        assert!(pending.push(cand("a")));
        assert!(pending.push(cand("b")));
        assert_eq!(pending.len(), 2);
        assert_eq!(pending.queue.front().unwrap().candidate, "a");
        pending.clear();
        assert!(pending.is_empty());
    }

    #[test]
    fn repeated_candidates_are_held_once() {
        let mut pending = PendingCandidates::new();
        for _ in 0..10_000 {
            pending.push(cand("candidate:1 1 udp 1 10.0.0.2 5000 typ host"));
        }
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn queue_is_bounded() {
        let mut pending = PendingCandidates::new();
        for n in 0..MAX_PENDING_CANDIDATES + 10 {
            pending.push(cand(&format!("candidate:{n} 1 udp 1 10.0.0.2 {n} typ host")));
        }
        assert_eq!(pending.len(), MAX_PENDING_CANDIDATES);
        assert!(!pending.push(cand("candidate:late 1 udp 1 10.0.0.9 1 typ host")));
        assert_eq!(
            pending.queue.back().unwrap().candidate,
            format!(
                "candidate:{n} 1 udp 1 10.0.0.2 {n} typ host",
                n = MAX_PENDING_CANDIDATES - 1
            )
        );
    }
}
