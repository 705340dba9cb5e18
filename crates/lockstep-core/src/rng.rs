//! Deterministic RNG state
//!
//! The cipher state is plain data that rides inside the domain payload and
//! round-trips through snapshots, so a participant's speculative replay draws
//! the exact keystream the authority draws. `Arc4` is a borrowed wrapper
//! constructed on demand; nothing long-lived aliases the authoritative state.

use lockstep_wire::Value;

use crate::{CoreError, CoreResult};

const TYPE_TAG: &str = "rng";

/// Serializable arc4 cipher state
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RngState {
    s: [u8; 256],
    i: u8,
    j: u8,
}

impl RngState {
    /// Key-schedule a new state from seed bytes, discarding the first 256
    /// output bytes to decorrelate from the key
    pub fn from_seed(seed: &[u8]) -> Self {
        let key: Vec<u8> = if seed.is_empty() { vec![0] } else { seed.to_vec() };

        let mut s = [0u8; 256];
        for (index, slot) in s.iter_mut().enumerate() {
            *slot = index as u8;
        }

        let mut j = 0u8;
        for i in 0..256 {
            j = j
                .wrapping_add(s[i])
                .wrapping_add(key[i % key.len()]);
            s.swap(i, j as usize);
        }

        let mut state = RngState { s, i: 0, j: 0 };
        {
            let mut rng = Arc4::new(&mut state);
            for _ in 0..256 {
                rng.next_byte();
            }
        }
        state
    }

    /// Convenience seeding from an integer
    pub fn from_u64(seed: u64) -> Self {
        Self::from_seed(&seed.to_le_bytes())
    }

    /// Encode as a tagged value so snapshots rehydrate it recognizably
    pub fn to_value(&self) -> Value {
        let value = Value::map();
        value.insert("@type", Value::from(TYPE_TAG));
        let pool = Value::array();
        for byte in self.s {
            pool.push(Value::from(byte as i64));
        }
        value.insert("s", pool);
        value.insert("i", Value::from(self.i as i64));
        value.insert("j", Value::from(self.j as i64));
        value
    }

    /// Decode from a tagged value
    pub fn from_value(value: &Value) -> CoreResult<Self> {
        match value.get("@type").and_then(|v| v.as_str()) {
            Some(tag) if tag == TYPE_TAG => {}
            _ => return Err(CoreError::WrongType("@type")),
        }

        let pool = value.get("s").ok_or(CoreError::MissingField("s"))?;
        if pool.len() != 256 {
            return Err(CoreError::WrongType("s"));
        }
        let mut s = [0u8; 256];
        for (index, slot) in s.iter_mut().enumerate() {
            let byte = pool
                .item(index)
                .and_then(|v| v.as_int())
                .ok_or(CoreError::WrongType("s"))?;
            *slot = u8::try_from(byte).map_err(|_| CoreError::WrongType("s"))?;
        }

        let i = value
            .get("i")
            .and_then(|v| v.as_int())
            .and_then(|n| u8::try_from(n).ok())
            .ok_or(CoreError::MissingField("i"))?;
        let j = value
            .get("j")
            .and_then(|v| v.as_int())
            .and_then(|n| u8::try_from(n).ok())
            .ok_or(CoreError::MissingField("j"))?;

        Ok(RngState { s, i, j })
    }
}

/// Borrowed keystream generator over an `RngState`
pub struct Arc4<'a> {
    state: &'a mut RngState,
}

impl<'a> Arc4<'a> {
    pub fn new(state: &'a mut RngState) -> Self {
        Arc4 { state }
    }

    /// Next keystream byte
    pub fn next_byte(&mut self) -> u8 {
        let st = &mut *self.state;
        st.i = st.i.wrapping_add(1);
        st.j = st.j.wrapping_add(st.s[st.i as usize]);
        st.s.swap(st.i as usize, st.j as usize);
        let index = st.s[st.i as usize].wrapping_add(st.s[st.j as usize]);
        st.s[index as usize]
    }

    /// Next 32 keystream bits
    pub fn next_u32(&mut self) -> u32 {
        u32::from_be_bytes([
            self.next_byte(),
            self.next_byte(),
            self.next_byte(),
            self.next_byte(),
        ])
    }

    /// Uniform float in [0, 1) with 53 bits of precision
    pub fn next_f64(&mut self) -> f64 {
        let hi = (self.next_u32() >> 6) as u64; // 26 bits
        let lo = (self.next_u32() >> 5) as u64; // 27 bits
        ((hi << 27) | lo) as f64 / (1u64 << 53) as f64
    }
}
