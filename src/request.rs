//! Bookkeeping for non-blocking sends and receives.
//!
//! A receive's source, tag and size are only known when it is issued, but the
//! trace record describing it is written when a wait or test reports it
//! complete, so the tracker keeps a snapshot until then.

use crate::error::{Error, Result};
use crate::types::{CommId, RequestId};
use std::collections::{HashMap, HashSet};

/// What an irecv looked like when it was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrecvCapture {
    pub bytes: u64,
    pub source: u32,
    pub tag: u32,
    pub comm: CommId,
}

/// Intent of an outstanding request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pending {
    Isend,
    Irecv(IrecvCapture),
}

/// A request that a wait/test call observed as finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Isend { request: RequestId },
    Irecv { request: RequestId, capture: IrecvCapture },
}

#[derive(Debug)]
pub struct RequestTracker {
    rank: u32,
    null_request: Option<RequestId>,
    pending: HashMap<RequestId, Pending>,
}

impl RequestTracker {
    pub fn new(rank: u32) -> Self {
        Self {
            rank,
            null_request: None,
            pending: HashMap::new(),
        }
    }

    /// Set the sentinel that is never tracked and always completes silently
    pub fn set_null_request(&mut self, request: RequestId) {
        self.null_request = Some(request);
    }

    pub fn is_null(&self, request: RequestId) -> bool {
        self.null_request == Some(request)
    }

    pub fn begin_isend(&mut self, request: RequestId) {
        self.begin(request, Pending::Isend);
    }

    pub fn begin_irecv(&mut self, request: RequestId, capture: IrecvCapture) {
        self.begin(request, Pending::Irecv(capture));
    }

    /// Track `request`, replacing any stale entry under the same id
    pub fn begin(&mut self, request: RequestId, kind: Pending) {
        if !self.is_null(request) {
            self.pending.insert(request, kind);
        }
    }

    /// Resolve one request. The null request yields `None`.
    pub fn complete(&mut self, request: RequestId) -> Result<Option<Completion>> {
        if self.is_null(request) {
            return Ok(None);
        }
        let kind = self.pending.remove(&request).ok_or(Error::UnknownRequest {
            request,
            rank: self.rank,
        })?;
        let completion = match kind {
            Pending::Isend => Completion::Isend { request },
            Pending::Irecv(capture) => Completion::Irecv { request, capture },
        };
        Ok(Some(completion))
    }

    /// Resolve a batch, completing each distinct id once, in first-seen order
    pub fn complete_all(&mut self, requests: &[RequestId]) -> Result<Vec<Completion>> {
        let mut seen = HashSet::new();
        let mut completions = Vec::new();
        for &request in requests {
            if self.is_null(request) || !seen.insert(request) {
                continue;
            }
            if let Some(completion) = self.complete(request)? {
                completions.push(completion);
            }
        }
        Ok(completions)
    }

    /// Resolve `requests[i]` for every reported index `i`, completing each
    /// distinct id once
    pub fn complete_indexed(
        &mut self,
        requests: &[RequestId],
        indices: &[i64],
    ) -> Result<Vec<Completion>> {
        let mut seen = HashSet::new();
        let mut completions = Vec::new();
        for &index in indices {
            let request = usize::try_from(index)
                .ok()
                .and_then(|i| requests.get(i))
                .copied()
                .ok_or(Error::RequestIndexOutOfRange {
                    index,
                    len: requests.len(),
                })?;
            if self.is_null(request) || !seen.insert(request) {
                continue;
            }
            if let Some(completion) = self.complete(request)? {
                completions.push(completion);
            }
        }
        Ok(completions)
    }

    /// Requests issued but never completed
    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NULL: RequestId = RequestId(-1);

    fn tracker() -> RequestTracker {
        let mut tracker = RequestTracker::new(0);
        tracker.set_null_request(NULL);
        tracker
    }

    fn capture() -> IrecvCapture {
        IrecvCapture {
            bytes: 80,
            source: 3,
            tag: 11,
            comm: CommId(0),
        }
    }

    #[test]
    fn test_isend_completes_once() {
        let mut tracker = tracker();
        tracker.begin_isend(RequestId(1));
        assert_eq!(
            tracker.complete(RequestId(1)).unwrap(),
            Some(Completion::Isend {
                request: RequestId(1)
            })
        );
        assert!(matches!(
            tracker.complete(RequestId(1)),
            Err(Error::UnknownRequest { .. })
        ));
    }

    #[test]
    fn test_irecv_returns_issue_snapshot() {
        let mut tracker = tracker();
        tracker.begin_irecv(RequestId(2), capture());
        assert_eq!(
            tracker.complete(RequestId(2)).unwrap(),
            Some(Completion::Irecv {
                request: RequestId(2),
                capture: capture(),
            })
        );
        assert_eq!(tracker.outstanding(), 0);
    }

    #[test]
    fn test_unknown_request_is_fatal() {
        let mut tracker = tracker();
        let err = tracker.complete(RequestId(5)).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_null_request_is_never_tracked() {
        let mut tracker = tracker();
        tracker.begin_isend(NULL);
        assert_eq!(tracker.outstanding(), 0);
        assert_eq!(tracker.complete(NULL).unwrap(), None);
    }

    #[test]
    fn test_stale_entry_is_overwritten() {
        let mut tracker = tracker();
        tracker.begin_isend(RequestId(1));
        tracker.begin_irecv(RequestId(1), capture());
        assert_eq!(tracker.outstanding(), 1);
        assert!(matches!(
            tracker.complete(RequestId(1)).unwrap(),
            Some(Completion::Irecv { .. })
        ));
    }

    #[test]
    fn test_batch_deduplicates() {
        let mut tracker = tracker();
        tracker.begin_isend(RequestId(1));
        tracker.begin_isend(RequestId(2));
        let done = tracker
            .complete_all(&[RequestId(1), NULL, RequestId(2), RequestId(1)])
            .unwrap();
        assert_eq!(done.len(), 2);
        assert_eq!(tracker.outstanding(), 0);
    }

    #[test]
    fn test_indexed_completion() {
        let mut tracker = tracker();
        tracker.begin_isend(RequestId(1));
        tracker.begin_isend(RequestId(2));
        tracker.begin_isend(RequestId(3));
        let requests = [RequestId(1), RequestId(2), RequestId(3)];
        let done = tracker.complete_indexed(&requests, &[2, 0]).unwrap();
        assert_eq!(
            done,
            vec![
                Completion::Isend {
                    request: RequestId(3)
                },
                Completion::Isend {
                    request: RequestId(1)
                },
            ]
        );
        assert_eq!(tracker.outstanding(), 1);

        assert!(matches!(
            tracker.complete_indexed(&requests, &[3]),
            Err(Error::RequestIndexOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn test_indexed_completion_repeats_an_id_once() {
        let mut tracker = tracker();
        tracker.begin_isend(RequestId(3));
        let requests = [RequestId(3), RequestId(3), NULL];
        let done = tracker.complete_indexed(&requests, &[0, 1, 2]).unwrap();
        assert_eq!(
            done,
            vec![Completion::Isend {
                request: RequestId(3)
            }]
        );
        assert_eq!(tracker.outstanding(), 0);
    }
}
