use std::fmt::{self, Write};

use serde::{Deserialize, Serialize};

/// 6-input XOR, so that no LUT input can be optimized away.
const LUT_INIT: u64 = 0x6996_9669_9669_6996;

/// Hands out fabric nets for I/O buffers to hook into.
///
/// Input nets sink buffer outputs, six to a LUT; output nets are LUT outputs
/// that drive buffer inputs and control pins. Enough `LUT6` instances are
/// emitted to cover both.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct LutMaker {
    inputs: usize,
    outputs: usize,
}

impl LutMaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_input_net(&mut self) -> String {
        let idx = self.inputs;
        self.inputs += 1;
        format!("lut_{}_i[{}]", idx / 6, idx % 6)
    }

    pub fn next_output_net(&mut self) -> String {
        let idx = self.outputs;
        self.outputs += 1;
        format!("lut_{idx}_o")
    }

    pub fn num_luts(&self) -> usize {
        self.inputs.div_ceil(6).max(self.outputs)
    }

    pub fn emit(&self, f: &mut impl Write) -> fmt::Result {
        for lut in 0..self.num_luts() {
            writeln!(f, "    wire [5:0] lut_{lut}_i;")?;
            writeln!(f, "    wire lut_{lut}_o;")?;
        }
        for lut in 0..self.num_luts() {
            let used = self.inputs.saturating_sub(lut * 6).min(6);
            for i in used..6 {
                writeln!(f, "    assign lut_{lut}_i[{i}] = 1'b0;")?;
            }
            writeln!(f)?;
            writeln!(f, "    (* KEEP, DONT_TOUCH *)")?;
            writeln!(f, "    LUT6 #(.INIT(64'h{LUT_INIT:016x})) lut_{lut} (")?;
            for i in 0..6 {
                writeln!(f, "        .I{i}(lut_{lut}_i[{i}]),")?;
            }
            writeln!(f, "        .O(lut_{lut}_o)")?;
            writeln!(f, "    );")?;
        }
        Ok(())
    }
}

#[test]
fn test_nets() {
    let mut luts = LutMaker::new();
    let inputs: Vec<_> = (0..7).map(|_| luts.next_input_net()).collect();
    assert_eq!(inputs[0], "lut_0_i[0]");
    assert_eq!(inputs[5], "lut_0_i[5]");
    assert_eq!(inputs[6], "lut_1_i[0]");
    assert_eq!(luts.next_output_net(), "lut_0_o");
    assert_eq!(luts.num_luts(), 2);
    for _ in 0..2 {
        luts.next_output_net();
    }
    assert_eq!(luts.num_luts(), 3);
}

#[test]
fn test_emit_ties_unused_inputs() {
    let mut luts = LutMaker::new();
    for _ in 0..7 {
        luts.next_input_net();
    }
    let mut text = String::new();
    luts.emit(&mut text).unwrap();
    assert!(!text.contains("assign lut_0_i"));
    assert!(!text.contains("assign lut_1_i[0]"));
    assert!(text.contains("assign lut_1_i[1] = 1'b0;"));
    assert!(text.contains("LUT6 #(.INIT(64'h6996966996696996)) lut_1 ("));
    assert_eq!(text.matches("LUT6").count(), 2);
}
