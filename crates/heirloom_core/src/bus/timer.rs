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

    bus::timer.rs

    Virtual clock and per-module update timers.

*/

use crate::module::ModuleHandle;

/// The most periods a single timer may catch up in one advance of the clock. Periods beyond
/// this are dropped rather than replayed.
pub const MAX_CATCH_UP: u64 = 64;

#[derive(Copy, Clone, Debug)]
pub struct Timer {
    owner: ModuleHandle,
    interval_us: u32,
    accumulated_us: u64,
    active: bool,
}

impl Timer {
    pub fn owner(&self) -> ModuleHandle {
        self.owner
    }
    pub fn interval_us(&self) -> u32 {
        self.interval_us
    }
    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// One timer per module, fired in the order the timers were registered.
#[derive(Default)]
pub struct TimerScheduler {
    timers: Vec<Timer>,
    now_us: u64,
}

impl TimerScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time in microseconds since power on.
    #[inline]
    pub fn now_us(&self) -> u64 {
        self.now_us
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn get(&self, owner: ModuleHandle) -> Option<&Timer> {
        self.timers.iter().find(|t| t.owner == owner)
    }

    fn get_mut(&mut self, owner: ModuleHandle) -> Option<&mut Timer> {
        self.timers.iter_mut().find(|t| t.owner == owner)
    }

    pub fn is_active(&self, owner: ModuleHandle) -> bool {
        self.get(owner).map(|t| t.active).unwrap_or(false)
    }

    /// Register a timer for `owner`. A module that already has a timer gets it re-armed with the
    /// new interval instead of a second one.
    pub fn request(&mut self, owner: ModuleHandle, interval_us: u32, active: bool) -> bool {
        if interval_us == 0 {
            return false;
        }
        match self.get_mut(owner) {
            Some(timer) => {
                timer.interval_us = interval_us;
                timer.accumulated_us = 0;
                timer.active = active;
            }
            None => self.timers.push(Timer {
                owner,
                interval_us,
                accumulated_us: 0,
                active,
            }),
        }
        true
    }

    pub fn set_active(&mut self, owner: ModuleHandle, active: bool) -> bool {
        match self.get_mut(owner) {
            Some(timer) => {
                if active && !timer.active {
                    timer.accumulated_us = 0;
                }
                timer.active = active;
                true
            }
            None => false,
        }
    }

    /// Change the interval of an existing timer and restart its period.
    pub fn reset_timer(&mut self, owner: ModuleHandle, interval_us: u32) -> bool {
        if interval_us == 0 {
            return false;
        }
        match self.get_mut(owner) {
            Some(timer) => {
                timer.interval_us = interval_us;
                timer.accumulated_us = 0;
                true
            }
            None => false,
        }
    }

    /// Advance virtual time. Owners of due timers are appended to `due`, once per elapsed period
    /// and in registration order. The part of the elapsed time that doesn't fill a period is
    /// carried into the next advance.
    pub fn advance(&mut self, delta_us: u64, due: &mut Vec<ModuleHandle>) {
        self.now_us = self.now_us.wrapping_add(delta_us);

        for timer in self.timers.iter_mut().filter(|t| t.active) {
            timer.accumulated_us += delta_us;
            let interval = timer.interval_us as u64;
            if timer.accumulated_us >= interval {
                let periods = timer.accumulated_us / interval;
                timer.accumulated_us -= periods * interval;
                for _ in 0..periods.min(MAX_CATCH_UP) {
                    due.push(timer.owner);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remainder_carries_forward() {
        let mut sched = TimerScheduler::new();
        let h = ModuleHandle(0);
        sched.request(h, 1000, true);

        let mut due = Vec::new();
        sched.advance(600, &mut due);
        assert!(due.is_empty());
        sched.advance(600, &mut due);
        assert_eq!(due, vec![h]);
        due.clear();
        // 200us carried, 800 more makes another full period
        sched.advance(800, &mut due);
        assert_eq!(due, vec![h]);
        assert_eq!(sched.now_us(), 2000);
    }

    #[test]
    fn test_registration_order_and_inactive() {
        let mut sched = TimerScheduler::new();
        let a = ModuleHandle(3);
        let b = ModuleHandle(1);
        let c = ModuleHandle(2);
        sched.request(a, 100, true);
        sched.request(b, 100, true);
        sched.request(c, 100, false);

        let mut due = Vec::new();
        sched.advance(100, &mut due);
        assert_eq!(due, vec![a, b]);

        assert!(sched.set_active(c, true));
        due.clear();
        sched.advance(250, &mut due);
        assert_eq!(due, vec![a, a, b, b, c, c]);
    }

    #[test]
    fn test_reset_timer_restarts_period() {
        let mut sched = TimerScheduler::new();
        let h = ModuleHandle(0);
        sched.request(h, 1000, true);
        let mut due = Vec::new();
        sched.advance(900, &mut due);
        assert!(sched.reset_timer(h, 500));
        sched.advance(400, &mut due);
        assert!(due.is_empty());
        sched.advance(100, &mut due);
        assert_eq!(due, vec![h]);

        assert!(!sched.reset_timer(ModuleHandle(9), 500));
        assert!(!sched.request(ModuleHandle(9), 0, true));
    }

    #[test]
    fn test_catch_up_is_bounded() {
        let mut sched = TimerScheduler::new();
        let h = ModuleHandle(0);
        sched.request(h, 1, true);
        let mut due = Vec::new();
        sched.advance(10_000, &mut due);
        assert_eq!(due.len() as u64, MAX_CATCH_UP);
    }
}
