/*
    Heirloom

    Copyright 2025-2026 The Heirloom Developers

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    logging.rs

    The logging context injected into every module.

*/

//! Every module receives a [LogContext] when it is constructed. The context carries the
//! `log` target for the module, its debug flag and an optional [TraceLogger] sink. Modules
//! never touch process-wide logger configuration; whoever owns the process installs a `log`
//! implementation and each module only writes through its own context.

use std::fmt::Arguments;

use crate::{module::ModuleType, tracelogger::TraceLogger};

#[derive(Debug)]
pub struct LogContext {
    target: &'static str,
    debug:  bool,
    trace:  TraceLogger,
}

impl LogContext {
    pub fn new(module: ModuleType) -> Self {
        Self {
            target: module.log_target(),
            debug:  false,
            trace:  TraceLogger::None,
        }
    }

    /// Context for code that owns modules rather than being one, such as the emulator loop.
    pub fn with_target(target: &'static str) -> Self {
        Self {
            target,
            debug:  false,
            trace:  TraceLogger::None,
        }
    }

    pub fn with_trace(mut self, trace: TraceLogger) -> Self {
        self.trace = trace;
        self
    }

    #[inline]
    pub fn target(&self) -> &'static str {
        self.target
    }

    #[inline]
    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    /// Register-level trace output. Only emitted with the debug flag set.
    pub fn trace(&mut self, args: Arguments) {
        if !self.debug {
            return;
        }
        if self.trace.is_some() {
            self.trace.println(args);
        }
        else {
            log::trace!(target: self.target, "{}", args);
        }
    }

    pub fn debug(&self, args: Arguments) {
        if self.debug {
            log::debug!(target: self.target, "{}", args);
        }
    }

    pub fn info(&self, args: Arguments) {
        log::info!(target: self.target, "{}", args);
    }

    pub fn warn(&self, args: Arguments) {
        log::warn!(target: self.target, "{}", args);
    }

    pub fn error(&self, args: Arguments) {
        log::error!(target: self.target, "{}", args);
    }

    pub fn flush(&mut self) {
        self.trace.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets() {
        let pic = LogContext::new(ModuleType::Pic);
        assert_eq!(pic.target(), "heirloom::pic");
        assert!(!pic.is_debug());

        let mut owner = LogContext::with_target("heirloom::emulator");
        assert_eq!(owner.target(), "heirloom::emulator");
        owner.set_debug(true);
        assert!(owner.is_debug());
    }
}
