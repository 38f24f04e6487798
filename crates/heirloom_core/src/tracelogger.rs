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

    tracelogger.rs

    A trace sink that can be handed to a module for high volume register traces.

*/

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

#[derive(Debug, Default)]
pub enum TraceLogger {
    FileWriter(BufWriter<File>),
    Console,
    #[default]
    None,
}

impl TraceLogger {
    /// Open a trace file. A file that can't be created leaves tracing disabled.
    pub fn from_filename<S: AsRef<Path>>(filename: S) -> Self {
        match File::create(filename.as_ref()) {
            Ok(file) => TraceLogger::FileWriter(BufWriter::new(file)),
            Err(e) => {
                log::error!(
                    "Couldn't create trace log file {}: {}",
                    filename.as_ref().display(),
                    e
                );
                TraceLogger::None
            }
        }
    }

    #[inline]
    pub fn is_some(&self) -> bool {
        !matches!(self, TraceLogger::None)
    }

    pub fn println(&mut self, msg: std::fmt::Arguments) {
        match self {
            TraceLogger::FileWriter(buf) => {
                _ = buf.write_fmt(msg);
                _ = buf.write_all(b"\n");
            }
            TraceLogger::Console => println!("{}", msg),
            TraceLogger::None => (),
        }
    }

    pub fn flush(&mut self) {
        if let TraceLogger::FileWriter(buf) = self {
            _ = buf.flush();
        }
    }
}
