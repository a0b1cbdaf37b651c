//! Test doubles for the runner and uploader seams.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::exec::{CommandRunner, ExecutionRequest};
use crate::types::{ExecError, UploadError};
use crate::workflows::deploy::{DeployRequest, UploadReceipt, Uploader};

/// Records every request and answers from a per-program script.
///
/// Programs without a scripted answer succeed with empty output.
#[derive(Default)]
pub struct RecordingRunner {
    requests: RefCell<Vec<ExecutionRequest>>,
    outputs: HashMap<String, String>,
    failures: HashMap<String, i32>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, program: &str, output: &str) -> Self {
        self.outputs.insert(program.to_string(), output.to_string());
        self
    }

    pub fn fail_on(mut self, program: &str, code: i32) -> Self {
        self.failures.insert(program.to_string(), code);
        self
    }

    pub fn requests(&self) -> Vec<ExecutionRequest> {
        self.requests.borrow().clone()
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.requests
            .borrow()
            .iter()
            .map(|r| r.argv().to_vec())
            .collect()
    }

    pub fn programs(&self) -> Vec<String> {
        self.requests
            .borrow()
            .iter()
            .map(|r| r.program().to_string())
            .collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn execute(&self, request: &ExecutionRequest) -> Result<String, ExecError> {
        self.requests.borrow_mut().push(request.clone());
        let program = request.program();
        if let Some(code) = self.failures.get(program) {
            return Err(ExecError::NonZeroExit {
                program: program.to_string(),
                code: *code,
            });
        }
        Ok(self.outputs.get(program).cloned().unwrap_or_default())
    }
}

/// Uploader that records requests instead of sending them.
#[derive(Default)]
pub struct FakeUploader {
    pub sent: RefCell<Vec<DeployRequest>>,
    pub reject: bool,
}

impl Uploader for FakeUploader {
    fn upload(&self, request: &DeployRequest) -> Result<UploadReceipt, UploadError> {
        self.sent.borrow_mut().push(request.clone());
        if self.reject {
            return Err(UploadError::Rejected {
                status_line: "HTTP/1.1 422 Unprocessable Entity".into(),
                body: "{\"errors\":{}}".into(),
            });
        }
        Ok(UploadReceipt {
            status_line: "HTTP/1.1 201 Created".into(),
            body: "{\"id\":1}".into(),
        })
    }
}
