/*!
    Draining a codec's output queue.
*/

use crate::{Error, Result};

/**
    One attempt to take output from a codec.
*/
#[derive(Debug)]
pub enum Received<T> {
    Item(T),
    /// This output was lost but the codec can keep going.
    Dropped(Error),
    /// Nothing more right now (`EAGAIN` or end of stream).
    Exhausted,
    Failed(Error),
}

/**
    Call `receive` until the codec runs dry.

    A failure before any output is returned as the error. A failure after
    some output keeps that output and is pushed to `dropped` instead, as is
    every [`Received::Dropped`] item, so the caller can report them.
*/
pub fn drain_output<T>(
    mut receive: impl FnMut() -> Received<T>,
    dropped: &mut Vec<Error>,
) -> Result<Vec<T>> {
    let mut items = Vec::new();
    loop {
        match receive() {
            Received::Item(item) => items.push(item),
            Received::Dropped(e) => dropped.push(e),
            Received::Exhausted => break,
            Received::Failed(e) if items.is_empty() => return Err(e),
            Received::Failed(e) => {
                dropped.push(e);
                break;
            }
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    fn scripted(steps: Vec<Received<u32>>) -> impl FnMut() -> Received<u32> {
        let mut steps = VecDeque::from(steps);
        move || steps.pop_front().unwrap_or(Received::Exhausted)
    }

    #[test]
    fn collects_until_exhausted() {
        let mut dropped = Vec::new();
        let out = drain_output(
            scripted(vec![Received::Item(1), Received::Item(2), Received::Exhausted, Received::Item(3)]),
            &mut dropped,
        )
        .unwrap();
        assert_eq!(out, [1, 2]);
        assert!(dropped.is_empty());
    }

    #[test]
    fn failure_after_output_keeps_output_and_records_error() {
        let mut dropped = Vec::new();
        let out = drain_output(
            scripted(vec![Received::Item(7), Received::Failed(Error::codec("corrupt slice"))]),
            &mut dropped,
        )
        .unwrap();
        assert_eq!(out, [7]);
        assert_eq!(dropped.len(), 1);
        assert!(dropped[0].to_string().contains("corrupt slice"));
    }

    #[test]
    fn failure_before_output_is_the_result() {
        let mut dropped = Vec::new();
        let err = drain_output(scripted(vec![Received::Failed(Error::codec("bad header"))]), &mut dropped)
            .unwrap_err();
        assert!(err.to_string().contains("bad header"));
        assert!(dropped.is_empty());
    }

    #[test]
    fn dropped_items_do_not_stop_the_drain() {
        let mut dropped = Vec::new();
        let out = drain_output(
            scripted(vec![
                Received::Dropped(Error::codec("transfer failed")),
                Received::Item(4),
            ]),
            &mut dropped,
        )
        .unwrap();
        assert_eq!(out, [4]);
        assert_eq!(dropped.len(), 1);
    }
}
