/*
 *  Copyright 2005 The WebRTC Project Authors. All rights reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

use std::time::{SystemTime, UNIX_EPOCH};

/// Wall clock time in milliseconds since the unix epoch.
///
/// Only used to annotate logs; estimator decisions run on the feedback clock.
pub fn time_utc_millis() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_millis() as i64,
        // The clock is set before 1970.
        Err(err) => -(err.duration().as_millis() as i64),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wall_clock_is_after_2020() {
        // 2020-01-01T00:00:00Z
        assert!(time_utc_millis() > 1_577_836_800_000);
    }
}
