// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use futures::{Stream, StreamExt};

/// Turn a raw `text/event-stream` byte stream into a stream of `data: ...`
/// payload lines, stripping the `data: ` prefix and skipping keep-alive
/// comments/blank lines. Carries a remainder buffer across chunk boundaries
/// since a provider's TCP frames never align with SSE line boundaries.
pub fn sse_data_lines<S, E>(bytes: S) -> impl Stream<Item = Result<String, E>>
where
    S: Stream<Item = Result<bytes::Bytes, E>>,
{
    futures::stream::unfold(
        (bytes.boxed(), String::new(), Vec::<String>::new()),
        |(mut bytes, mut remainder, mut pending)| async move {
            loop {
                if let Some(line) = pending.pop() {
                    return Some((Ok(line), (bytes, remainder, pending)));
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => {
                        remainder.push_str(&String::from_utf8_lossy(&chunk));
                        let mut lines: Vec<&str> = remainder.split('\n').collect();
                        // The last split segment may be a partial line; keep it.
                        let tail = lines.pop().unwrap_or("").to_string();
                        let mut extracted = Vec::new();
                        for line in lines {
                            let line = line.trim_end_matches('\r');
                            if let Some(data) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) {
                                if data != "[DONE]" {
                                    extracted.push(data.to_string());
                                }
                            }
                        }
                        remainder = tail;
                        if extracted.is_empty() {
                            continue;
                        }
                        extracted.reverse();
                        pending = extracted;
                        continue;
                    }
                    Some(Err(e)) => return Some((Err(e), (bytes, remainder, pending))),
                    None => return None,
                }
            }
        },
    )
}
