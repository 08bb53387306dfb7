use std::fmt::{self, Write};

use crate::{
    config::{IobPrim, IobRecord},
    manifest::Manifest,
    odelay::{OdelayManifest, OdelayUse},
};

fn bool_attr(val: bool) -> &'static str {
    if val { "\"TRUE\"" } else { "\"FALSE\"" }
}

fn pad_counts(manifest: &Manifest) -> (usize, usize, usize) {
    let mut res = (0, 0, 0);
    for rec in manifest.active_sites() {
        let Some(usage) = &rec.usage else { continue };
        let pads = 1 + usize::from(usage.pads.bpad.is_some());
        match usage.prim {
            IobPrim::Ibuf { .. } | IobPrim::Ibufds { .. } => res.0 += pads,
            IobPrim::Obuf { .. } | IobPrim::Obufds { .. } | IobPrim::Obuftds { .. } => {
                res.1 += pads
            }
            IobPrim::IobufDcien { .. } => res.2 += pads,
        }
    }
    res
}

fn emit_site(f: &mut impl Write, rec: &IobRecord) -> fmt::Result {
    let Some(usage) = &rec.usage else {
        return Ok(());
    };
    let site = &rec.site;
    let prim = &usage.prim;
    let pads = &usage.pads;
    let std = rec.iostd();
    let mut attrs = vec![(
        "IOSTANDARD",
        format!("\"{}\"", std.prim_name(prim.is_bidir())),
    )];
    if let Some(drive) = prim.drive() {
        attrs.push(("DRIVE", drive.to_string()));
    }
    if let Some(slew) = prim.slew() {
        attrs.push(("SLEW", format!("\"{}\"", slew.name())));
    }
    match *prim {
        IobPrim::Ibuf { ibuf_low_pwr, .. } => {
            attrs.push(("IBUF_LOW_PWR", bool_attr(ibuf_low_pwr).into()));
        }
        IobPrim::Ibufds {
            ibuf_low_pwr,
            diff_term,
            ..
        } => {
            attrs.push(("IBUF_LOW_PWR", bool_attr(ibuf_low_pwr).into()));
            attrs.push(("DIFF_TERM", bool_attr(diff_term).into()));
        }
        _ => (),
    }

    let to_fabric = pads.to_fabric.as_deref().unwrap_or("");
    let from_fabric = pads.from_fabric.as_deref().unwrap_or("1'b0");
    let bpad = pads.bpad.as_deref().unwrap_or("");
    let mut pins = vec![];
    match prim {
        IobPrim::Ibuf { .. } => {
            pins.push(("I", pads.pad.as_str()));
            pins.push(("O", to_fabric));
        }
        IobPrim::Ibufds { .. } => {
            pins.push(("I", pads.pad.as_str()));
            pins.push(("IB", bpad));
            pins.push(("O", to_fabric));
        }
        IobPrim::Obuf { .. } => {
            pins.push(("O", pads.pad.as_str()));
            pins.push(("I", from_fabric));
        }
        IobPrim::Obufds { .. } => {
            pins.push(("O", pads.pad.as_str()));
            pins.push(("OB", bpad));
            pins.push(("I", from_fabric));
        }
        IobPrim::Obuftds { tristate, .. } => {
            pins.push(("O", pads.pad.as_str()));
            pins.push(("OB", bpad));
            pins.push(("T", tristate.verilog()));
            pins.push(("I", from_fabric));
        }
        IobPrim::IobufDcien {
            tristate,
            ibufdisable,
            dcitermdisable,
            ..
        } => {
            pins.push(("IO", pads.pad.as_str()));
            pins.push(("I", from_fabric));
            pins.push(("O", to_fabric));
            pins.push(("T", tristate.verilog()));
            pins.push(("IBUFDISABLE", ibufdisable.verilog()));
            pins.push(("DCITERMDISABLE", dcitermdisable.verilog()));
        }
    }

    writeln!(f)?;
    if prim.idelay_only() {
        writeln!(f, "    wire idelay_{site};")?;
    }
    writeln!(f, "    (* KEEP, DONT_TOUCH *)")?;
    writeln!(f, "    {} #(", prim.name())?;
    for (i, (attr, val)) in attrs.iter().enumerate() {
        let sep = if i + 1 == attrs.len() { "" } else { "," };
        writeln!(f, "        .{attr}({val}){sep}")?;
    }
    writeln!(f, "    ) {}_{site} (", prim.name().to_ascii_lowercase())?;
    for (i, (pin, net)) in pins.iter().enumerate() {
        let sep = if i + 1 == pins.len() { "" } else { "," };
        writeln!(f, "        .{pin}({net}){sep}")?;
    }
    writeln!(f, "    );")?;
    if prim.idelay_only() {
        writeln!(f, "    (* KEEP, DONT_TOUCH *)")?;
        writeln!(f, "    IDELAYE2 idelay_site_{site} (")?;
        writeln!(f, "        .IDATAIN(idelay_{site})")?;
        writeln!(f, "    );")?;
    }
    Ok(())
}

/// Writes the `top` module of a sampled IOB design.
pub fn emit_iob_top(f: &mut impl Write, manifest: &Manifest) -> fmt::Result {
    let (n_di, n_do, n_dio) = pad_counts(manifest);
    writeln!(f, "// seed: {:016x}", manifest.seed)?;
    writeln!(f, "// iostandard: {}", manifest.iostandard)?;
    writeln!(f, "`define N_DI {n_di}")?;
    writeln!(f, "`define N_DO {n_do}")?;
    writeln!(f, "`define N_DIO {n_dio}")?;
    writeln!(f)?;
    let mut ports = vec![];
    if n_di != 0 {
        ports.push("input wire [`N_DI-1:0] di");
    }
    if n_do != 0 {
        ports.push("output wire [`N_DO-1:0] do");
    }
    if n_dio != 0 {
        ports.push("inout wire [`N_DIO-1:0] dio");
    }
    writeln!(f, "module top({});", ports.join(", "))?;
    if manifest.any_idelay() {
        writeln!(f)?;
        writeln!(f, "    (* KEEP, DONT_TOUCH *)")?;
        writeln!(f, "    IDELAYCTRL idelayctrl();")?;
    }
    // keeps the placer happy when nothing else needs fabric
    writeln!(f)?;
    writeln!(f, "    (* KEEP, DONT_TOUCH *)")?;
    writeln!(f, "    LUT6 dummy_lut();")?;
    writeln!(f)?;
    manifest.luts.emit(f)?;
    for rec in &manifest.sites {
        emit_site(f, rec)?;
    }
    writeln!(f)?;
    writeln!(f, "endmodule")?;
    Ok(())
}

const ODELAY_MOD: &str = r#"
(* KEEP, DONT_TOUCH *)
module mod(
    input wire clk,
    output wire O
);

    parameter LOC = "";
    parameter ODELAY_TYPE = "FIXED";
    parameter ODELAY_VALUE = 0;
    parameter HIGH_PERFORMANCE_MODE = "TRUE";
    parameter CINVCTRL_SEL = "FALSE";
    parameter PIPE_SEL = "FALSE";
    parameter IS_C_INVERTED = 0;
    parameter IS_ODATAIN_INVERTED = 0;

    wire lut;

    (* KEEP, DONT_TOUCH *)
    LUT2 l(.O(lut));

    (* LOC=LOC, KEEP, DONT_TOUCH *)
    ODELAYE2 #(
        .ODELAY_TYPE(ODELAY_TYPE),
        .ODELAY_VALUE(ODELAY_VALUE),
        .DELAY_SRC("ODATAIN"),
        .HIGH_PERFORMANCE_MODE(HIGH_PERFORMANCE_MODE),
        .SIGNAL_PATTERN("DATA"),
        .CINVCTRL_SEL(CINVCTRL_SEL),
        .PIPE_SEL(PIPE_SEL),
        .IS_C_INVERTED(IS_C_INVERTED),
        .IS_ODATAIN_INVERTED(IS_ODATAIN_INVERTED)
    ) odelay (
        .C(clk),
        .ODATAIN(lut),
        .DATAOUT(O)
    );
endmodule
"#;

/// Writes the ODELAY design: a `top` with one `OBUF` per record plus the
/// `mod` wrapper placing each delay.
pub fn emit_odelay_top(f: &mut impl Write, manifest: &OdelayManifest) -> fmt::Result {
    writeln!(f, "// tile count: {}", manifest.num_tiles)?;
    writeln!(f, "// seed: {:016x}", manifest.seed)?;
    writeln!(f)?;
    writeln!(f, "module top(")?;
    writeln!(f, "    (* CLOCK_BUFFER_TYPE = \"NONE\" *)")?;
    if manifest.num_outputs == 0 {
        writeln!(f, "    input wire clk")?;
        writeln!(f, ");")?;
    } else {
        writeln!(f, "    input wire clk,")?;
        writeln!(f, "    output wire [{}:0] do", manifest.num_outputs - 1)?;
        writeln!(f, ");")?;
        writeln!(f, "    wire [{}:0] do_buf;", manifest.num_outputs - 1)?;
    }
    for rec in &manifest.sites {
        let idx = rec.index;
        writeln!(f)?;
        writeln!(f, "    (* LOC=\"{}\", KEEP, DONT_TOUCH *)", rec.iob)?;
        match &rec.usage {
            OdelayUse::Bypass { value } => {
                writeln!(
                    f,
                    "    OBUF obuf_{idx:03} (.I(1'b{}), .O(do[{idx}]));",
                    u8::from(*value)
                )?;
            }
            OdelayUse::Delay(params) => {
                writeln!(f, "    OBUF obuf_{idx:03} (.I(do_buf[{idx}]), .O(do[{idx}]));")?;
                writeln!(f, "    mod #(")?;
                writeln!(f, "        .LOC(\"{}\"),", rec.odelay)?;
                writeln!(f, "        .ODELAY_TYPE(\"{}\"),", params.odelay_type.name())?;
                writeln!(f, "        .ODELAY_VALUE({}),", params.odelay_value)?;
                writeln!(
                    f,
                    "        .HIGH_PERFORMANCE_MODE({}),",
                    bool_attr(params.high_performance_mode)
                )?;
                writeln!(f, "        .CINVCTRL_SEL({}),", bool_attr(params.cinvctrl_sel))?;
                writeln!(f, "        .PIPE_SEL({}),", bool_attr(params.pipe_sel))?;
                writeln!(f, "        .IS_C_INVERTED({}),", u8::from(params.is_c_inverted))?;
                writeln!(
                    f,
                    "        .IS_ODATAIN_INVERTED({})",
                    u8::from(params.is_odatain_inverted)
                )?;
                writeln!(f, "    ) mod_{idx:03} (.clk(clk), .O(do_buf[{idx}]));")?;
            }
        }
    }
    writeln!(f)?;
    writeln!(f, "    (* KEEP, DONT_TOUCH *)")?;
    writeln!(f, "    IDELAYCTRL idelayctrl();")?;
    writeln!(f, "endmodule")?;
    f.write_str(ODELAY_MOD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{CtrlSrc, IobPads, IobUsage, Pull, Slew},
        device::test_grid,
        lutmaker::LutMaker,
        odelay::sample_odelay,
        sample::sample_iobs,
    };

    fn iobuf_manifest() -> Manifest {
        let mut luts = LutMaker::new();
        let from_fabric = luts.next_output_net();
        let to_fabric = luts.next_input_net();
        let tristate = luts.next_output_net();
        Manifest {
            seed: 5,
            iostandard: "SSTL15_DCI".into(),
            iobanks: vec![33],
            internal_vref: [(33, 750)].into_iter().collect(),
            luts,
            sites: vec![IobRecord {
                tile: "RIOB18_X43Y13".into(),
                site: "IOB_X1Y14".into(),
                iostandard: "SSTL15_DCI".into(),
                usage: Some(IobUsage {
                    pull: Pull::None,
                    prim: IobPrim::IobufDcien {
                        drive: None,
                        slew: Slew::Slow,
                        tristate: CtrlSrc::Net(tristate),
                        ibufdisable: CtrlSrc::Gnd,
                        dcitermdisable: CtrlSrc::Gnd,
                    },
                    pads: IobPads {
                        pad: "dio[0]".into(),
                        bpad: None,
                        to_fabric: Some(to_fabric),
                        from_fabric: Some(from_fabric),
                    },
                }),
            }],
        }
    }

    #[test]
    fn test_iobuf_top() {
        let mut text = String::new();
        emit_iob_top(&mut text, &iobuf_manifest()).unwrap();
        assert!(text.contains("`define N_DIO 1\n"));
        assert!(text.contains("module top(inout wire [`N_DIO-1:0] dio);"));
        assert!(text.contains(".IOSTANDARD(\"SSTL15_T_DCI\")"));
        assert!(!text.contains(".DRIVE("));
        assert!(text.contains(".T(lut_1_o),"));
        assert!(text.contains(".IBUFDISABLE(1'b0),"));
        assert!(text.contains(".O(lut_0_i[0]),"));
        assert!(text.contains("iobuf_dcien_IOB_X1Y14 ("));
        assert!(!text.contains("IDELAYCTRL"));
        assert_eq!(text.matches("LUT6 #").count(), 2);
        assert!(text.trim_end().ends_with("endmodule"));
    }

    #[test]
    fn test_sampled_top_pads() {
        let grid = test_grid();
        for seed in 0..50 {
            let manifest = sample_iobs(&grid, seed, 0);
            let mut text = String::new();
            emit_iob_top(&mut text, &manifest).unwrap();
            let (n_di, n_do, n_dio) = pad_counts(&manifest);
            for (prefix, n) in [("di", n_di), ("do", n_do), ("dio", n_dio)] {
                for i in 0..n {
                    assert!(text.contains(&format!("({prefix}[{i}])")), "{prefix}[{i}] missing");
                }
                assert!(!text.contains(&format!("({prefix}[{n}])")));
            }
            assert_eq!(text.contains("IDELAYCTRL"), manifest.any_idelay());
            assert_eq!(
                text.matches("(* KEEP, DONT_TOUCH *)").count(),
                1 + usize::from(manifest.any_idelay())
                    + manifest.luts.num_luts()
                    + manifest.active_sites().count()
                    + text.matches("IDELAYE2").count()
            );
        }
    }

    #[test]
    fn test_odelay_top() {
        let grid = test_grid();
        let manifest = (0..50)
            .map(|seed| sample_odelay(&grid, seed, 0))
            .find(|m| m.num_outputs > 1)
            .unwrap();
        let mut text = String::new();
        emit_odelay_top(&mut text, &manifest).unwrap();
        assert!(text.contains(&format!(
            "output wire [{}:0] do",
            manifest.num_outputs - 1
        )));
        assert_eq!(text.matches("OBUF obuf_").count(), manifest.num_outputs);
        let delays = manifest
            .sites
            .iter()
            .filter(|rec| matches!(rec.usage, OdelayUse::Delay(_)))
            .count();
        assert_eq!(text.matches(") mod_").count(), delays);
        assert!(text.contains("module mod("));
    }
}
