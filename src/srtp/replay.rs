use super::status::SrtpStatus;

/// Packets tracked behind the highest index seen.
const WINDOW_SIZE: u64 = 128;

/// Half the sequence number space.
const SEQ_MEDIAN: u64 = 1 << 15;

/// Replay protection over a packet index.
///
/// For SRTP the index is the 48 bit `ROC || SEQ`, for SRTCP the 31 bit
/// SRTCP index.
#[derive(Debug, Clone, Default)]
pub struct ReplayWindow {
    /// Highest index added.
    top: Option<u64>,
    /// Bit `i` set means `top - i` has been added.
    mask: u128,
}

impl ReplayWindow {
    pub fn top(&self) -> Option<u64> {
        self.top
    }

    /// Whether `index` may be accepted.
    pub fn check(&self, index: u64) -> Result<(), SrtpStatus> {
        let Some(top) = self.top else {
            return Ok(());
        };

        if index > top {
            return Ok(());
        }

        let behind = top - index;

        if behind >= WINDOW_SIZE {
            return Err(SrtpStatus::ReplayOld);
        }

        if self.mask & (1_u128 << behind) != 0 {
            return Err(SrtpStatus::ReplayFail);
        }

        Ok(())
    }

    /// Mark `index` as seen.
    pub fn add(&mut self, index: u64) {
        let Some(top) = self.top else {
            self.top = Some(index);
            self.mask = 1;
            return;
        };

        if index > top {
            let ahead = index - top;
            self.mask = if ahead >= WINDOW_SIZE {
                0
            } else {
                self.mask << ahead
            };
            self.mask |= 1;
            self.top = Some(index);
        } else {
            let behind = top - index;
            if behind < WINDOW_SIZE {
                self.mask |= 1_u128 << behind;
            }
        }
    }
}

/// Guess the 48 bit SRTP index of `seq` given the highest index seen.
///
/// RFC 3711 3.3.1. The rollover counter is the one of `last` or one off from
/// it, whichever puts `seq` closest to `last`.
pub fn estimate_index(last: Option<u64>, seq: u16) -> u64 {
    let seq = seq as u64;

    let Some(last) = last else {
        return seq;
    };

    // No rollover has happened and none can be inferred backwards.
    if last <= SEQ_MEDIAN {
        return seq;
    }

    let last_roc = (last >> 16) as u32;
    let last_seq = last & 0xffff;

    let roc = if last_seq < SEQ_MEDIAN {
        if seq > last_seq + SEQ_MEDIAN {
            last_roc.wrapping_sub(1)
        } else {
            last_roc
        }
    } else if last_seq - SEQ_MEDIAN > seq {
        last_roc.wrapping_add(1)
    } else {
        last_roc
    };

    ((roc as u64) << 16) | seq
}
