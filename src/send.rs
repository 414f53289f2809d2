use serde::Serialize;

use crate::merge::MergeResult;
use crate::push::PushResult;

/// Everything that happened while sending a set of branches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SendBranchResult {
    pub merge_results: Vec<MergeResult>,
    pub push_results: Vec<PushResult>,
}

/// One step of a send, in the order the steps were taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStep<'a> {
    Merge(&'a MergeResult),
    Push(&'a PushResult),
}

impl SendBranchResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_merge_result(&self) -> Option<&MergeResult> {
        self.merge_results.last()
    }

    pub fn last_push_result(&self) -> Option<&PushResult> {
        self.push_results.last()
    }

    /// Merge and push results interleaved by index: merge 0, push 0, merge 1...
    pub fn iter(&self) -> SendSteps<'_> {
        SendSteps {
            result: self,
            idx: 0,
            push_next: false,
        }
    }
}

impl<'a> IntoIterator for &'a SendBranchResult {
    type Item = SendStep<'a>;
    type IntoIter = SendSteps<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct SendSteps<'a> {
    result: &'a SendBranchResult,
    idx: usize,
    push_next: bool,
}

impl<'a> Iterator for SendSteps<'a> {
    type Item = SendStep<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.result;
        let len = result.merge_results.len().max(result.push_results.len());
        while self.idx < len {
            let (idx, push) = (self.idx, self.push_next);
            if push {
                self.idx += 1;
            }
            self.push_next = !push;

            let step = if push {
                result.push_results.get(idx).map(SendStep::Push)
            } else {
                result.merge_results.get(idx).map(SendStep::Merge)
            };
            if step.is_some() {
                return step;
            }
        }
        None
    }
}
