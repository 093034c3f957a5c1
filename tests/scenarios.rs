//! End-to-end scenarios: source through the assembler, image through the
//! CPU, asserting on final machine state.

use bbb::assembler::assemble_source;
use bbb::cpu::Cpu;
use bbb::host::HeadlessBridge;
use bbb::image::build_header;
use bbb::memory::{Memory, DEFAULT_SIZE};
use bbb::opcodes::{Flag, Opcode, RegisterCode};

#[test]
fn countdown_halts_with_a_at_zero_and_zero_flag_set() {
    let source = "\
#data 0014 0000 0000 0000 0000
#org 0014
MOV 5 %a
loop:
DEC %a
JMP Z=0 .loop
OR 0x2 %s1
";
    let image = assemble_source(source, "countdown.asm").expect("assembles cleanly");

    let mut memory = Memory::new(DEFAULT_SIZE);
    memory.load_image(&image);
    let mut cpu = Cpu::new(memory);
    let mut host = HeadlessBridge;
    cpu.run(&mut host);

    assert_eq!(cpu.register(RegisterCode::A), 0);
    assert!(cpu.get_flag(Flag::Zero));
    assert!(cpu.get_flag(Flag::Halt));
}

#[test]
fn keyboard_style_interrupt_saves_pc_and_the_mask_clears_on_the_matching_pop() {
    // Main program at 0x0010 is a single NOP; the handler at 0x0200 clears
    // the I-flag (AND 0 into S1) before POP %pc, the sequence the core
    // expects before it will honor a second dispatch.
    let mut bytes = vec![0u8; 0x0210];
    let header = build_header(0x0010, 0x0300, 0x0200, 0, 0);
    bytes[0..20].copy_from_slice(&header);
    bytes[0x0010] = Opcode::Nop as u8;
    bytes[0x0011] = Opcode::Nop as u8;
    let handler = [
        Opcode::And as u8,
        RegisterCode::Cv as u8,
        RegisterCode::S1 as u8,
        0,
        0,
        0,
        0,
        Opcode::Pop as u8,
        RegisterCode::Pc as u8,
    ];
    bytes[0x0200..0x0200 + handler.len()].copy_from_slice(&handler);

    let mut memory = Memory::new(DEFAULT_SIZE);
    memory.load_image(&bytes);
    let mut cpu = Cpu::new(memory);
    cpu.start();

    cpu.set_register(RegisterCode::S1, 0b0001); // inject: assert the I-flag
    cpu.step(); // NOP at 0x10, then dispatch: push 0x11, pc <- IV (0x200)
    assert_eq!(cpu.pc(), 0x0200);

    cpu.step(); // AND 0 %s1 clears the I-flag
    assert!(!cpu.get_flag(Flag::Interrupt));

    cpu.step(); // POP %pc restores the saved return address and clears the mask
    assert_eq!(cpu.pc(), 0x0011);

    // Re-assert the I-flag; a second dispatch only fires if the mask
    // actually cleared above.
    cpu.set_register(RegisterCode::S1, 0b0001);
    cpu.step(); // NOP at 0x11
    assert_eq!(cpu.pc(), 0x0200, "mask must have cleared for this to re-dispatch");
}

#[test]
fn stack_round_trip_restores_the_stack_pointer() {
    let source = "\
#data 0014 0100 0000 0000 0000
#org 0014
PSH 0xF
PSH %a
POP %b
POP %c
";
    let image = assemble_source(source, "stack.asm").expect("assembles cleanly");

    let mut memory = Memory::new(DEFAULT_SIZE);
    memory.load_image(&image);
    let mut cpu = Cpu::new(memory);
    cpu.start();
    cpu.set_register(RegisterCode::A, 0xA);
    let origin = cpu.sp();

    cpu.step();
    cpu.step();
    cpu.step();
    cpu.step();

    assert_eq!(cpu.register(RegisterCode::B), 0xA);
    assert_eq!(cpu.register(RegisterCode::C), 0xF);
    assert_eq!(cpu.sp(), origin);
}

/// The worked-example table for this scenario claims `Negative=0` after
/// `ADD %a %b` with A=4, B=9, but 13 (0b1101) has its sign bit set under the
/// documented ADD flag rule -- and the reference machine's own sign-extend
/// logic agrees. This asserts the value the rule actually produces.
#[test]
fn two_register_add_sets_negative_for_a_result_with_its_sign_bit_set() {
    let mut bytes = build_header(0, 0, 0, 0, 0).to_vec();
    bytes.extend_from_slice(&[Opcode::Add as u8, RegisterCode::A as u8, RegisterCode::B as u8]);
    let mut memory = Memory::new(DEFAULT_SIZE);
    memory.load_image(&bytes);
    let mut cpu = Cpu::new(memory);
    cpu.start();
    cpu.set_register(RegisterCode::A, 4);
    cpu.set_register(RegisterCode::B, 9);

    cpu.step();

    assert_eq!(cpu.register(RegisterCode::B), 0xD);
    assert!(!cpu.get_flag(Flag::Zero));
    assert!(cpu.get_flag(Flag::Negative));
}
