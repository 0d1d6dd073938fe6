use std::fmt;

/// Guest condition codes (the 4-bit selector used by conditional select).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Cond {
    EQ = 0,  // Z == 1
    NE = 1,  // Z == 0
    CS = 2,  // C == 1
    CC = 3,  // C == 0
    MI = 4,  // N == 1
    PL = 5,  // N == 0
    VS = 6,  // V == 1
    VC = 7,  // V == 0
    HI = 8,  // C == 1 && Z == 0
    LS = 9,  // C == 0 || Z == 1
    GE = 10, // N == V
    LT = 11, // N != V
    GT = 12, // Z == 0 && N == V
    LE = 13, // Z == 1 || N != V
    AL = 14, // always
    NV = 15, // reserved; behaves as always
}

impl Cond {
    pub const HS: Cond = Cond::CS;
    pub const LO: Cond = Cond::CC;

    /// Decode a raw 4-bit condition field.
    pub fn from_u8(val: u8) -> Cond {
        match val & 0xF {
            0 => Cond::EQ,
            1 => Cond::NE,
            2 => Cond::CS,
            3 => Cond::CC,
            4 => Cond::MI,
            5 => Cond::PL,
            6 => Cond::VS,
            7 => Cond::VC,
            8 => Cond::HI,
            9 => Cond::LS,
            10 => Cond::GE,
            11 => Cond::LT,
            12 => Cond::GT,
            13 => Cond::LE,
            14 => Cond::AL,
            15 => Cond::NV,
            _ => unreachable!(),
        }
    }

    /// The opposite condition (flips the low bit of the encoding).
    pub fn invert(self) -> Cond {
        Cond::from_u8(self as u8 ^ 1)
    }
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Cond::EQ => "eq",
            Cond::NE => "ne",
            Cond::CS => "cs",
            Cond::CC => "cc",
            Cond::MI => "mi",
            Cond::PL => "pl",
            Cond::VS => "vs",
            Cond::VC => "vc",
            Cond::HI => "hi",
            Cond::LS => "ls",
            Cond::GE => "ge",
            Cond::LT => "lt",
            Cond::GT => "gt",
            Cond::LE => "le",
            Cond::AL => "al",
            Cond::NV => "nv",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_u8_round_trips() {
        for raw in 0u8..16 {
            assert_eq!(Cond::from_u8(raw) as u8, raw);
        }
    }

    #[test]
    fn invert_pairs() {
        assert_eq!(Cond::EQ.invert(), Cond::NE);
        assert_eq!(Cond::HI.invert(), Cond::LS);
        assert_eq!(Cond::AL.invert(), Cond::NV);
    }
}
