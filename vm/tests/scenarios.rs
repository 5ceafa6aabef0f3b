//! End-to-end scenarios driven through the VM facade.

use edvm::{VirtualMachine, VmConfig, VmError};
use edvm_core::{
    error::VmCoreError,
    instruction::{opcode::Opcode, AddressingMode, Instruction},
    io::PortBus,
    state::{cpu_state::CpuStatus, flags::Flag},
};
use edvm_firmware::FirmwareCodec;
use edvm_types::types::Word;
use std::{cell::RefCell, rc::Rc};
use tempfile::tempdir;

const MEM_SIZE: usize = 16 * 1024 * 1024;

#[derive(Default)]
struct BusLog {
    printed: Vec<u64>,
    written: Vec<(u16, u64)>,
}

/// Port bus whose log outlives the machine, so tests can assert on it.
#[derive(Clone, Default)]
struct SharedBus(Rc<RefCell<BusLog>>);

impl PortBus for SharedBus {
    fn read(&mut self, _port: u16) -> u64 {
        0
    }

    fn write(&mut self, port: u16, value: u64) {
        self.0.borrow_mut().written.push((port, value));
    }

    fn print(&mut self, value: u64) {
        self.0.borrow_mut().printed.push(value);
    }
}

fn imm(op: Opcode, reg1: u8, value: u32) -> Word {
    Instruction::new(op, AddressingMode::Immediate, reg1, 0, value).encode()
}

fn reg(op: Opcode, reg1: u8, reg2: u8) -> Word {
    Instruction::new(op, AddressingMode::Register, reg1, reg2, 0).encode()
}

fn nop() -> Word {
    Instruction::new(Opcode::NOP, AddressingMode::Register, 0, 0, 0).encode()
}

fn hlt() -> Word {
    Instruction::new(Opcode::HLT, AddressingMode::Register, 0, 0, 0).encode()
}

/// S1: MOV R0,#42; MOV R1,#10; ADD R0,R1; PUSH R0; POP R2; HLT
fn s1_program() -> Vec<Word> {
    vec![
        imm(Opcode::MOV, 0, 42),
        imm(Opcode::MOV, 1, 10),
        reg(Opcode::ADD, 0, 1),
        reg(Opcode::PUSH, 0, 0),
        reg(Opcode::POP, 2, 0),
        hlt(),
    ]
}

#[test]
fn s1_arithmetic() {
    let mut vm = VirtualMachine::new(MEM_SIZE);
    vm.load_program(&s1_program(), 0).unwrap();
    vm.run().unwrap();
    assert_eq!(vm.get_register(2), 52);
    assert!(!vm.cpu().get_flag(Flag::Zero));
    assert!(!vm.cpu().get_flag(Flag::Negative));
    assert_eq!(vm.status(), CpuStatus::Halted);
}

#[test]
fn s2_comparison_and_branch() {
    let mut vm = VirtualMachine::new(MEM_SIZE);
    let program = vec![
        imm(Opcode::MOV, 0, 10),  // 0x00
        imm(Opcode::MOV, 1, 10),  // 0x08
        reg(Opcode::CMP, 0, 1),   // 0x10
        imm(Opcode::JEQ, 0, 0x40), // 0x18
        imm(Opcode::MOV, 2, 999), // 0x20
        imm(Opcode::JMP, 0, 0x60), // 0x28
        nop(),                    // 0x30
        nop(),                    // 0x38
        imm(Opcode::MOV, 2, 42),  // 0x40
        nop(),                    // 0x48
        nop(),                    // 0x50
        nop(),                    // 0x58
        hlt(),                    // 0x60
    ];
    vm.load_program(&program, 0).unwrap();
    vm.run().unwrap();
    assert_eq!(vm.get_register(2), 42);
}

#[test]
fn s3_division_by_zero_halts_cleanly() {
    let mut vm = VirtualMachine::new(MEM_SIZE);
    let program = vec![
        imm(Opcode::MOV, 0, 5),
        imm(Opcode::MOV, 1, 0),
        reg(Opcode::DIV, 0, 1),
        imm(Opcode::MOV, 3, 77),
        hlt(),
    ];
    vm.load_program(&program, 0).unwrap();
    let err = vm.run().unwrap_err();
    assert!(matches!(
        err,
        VmError::Execution(VmCoreError::DivisionByZero)
    ));
    // The MOV after the faulting DIV never ran.
    assert_eq!(vm.get_register(3), 0);
    assert_eq!(vm.get_register(0), 5);
    assert_eq!(vm.status(), CpuStatus::Halted);
}

#[test]
fn s4_stack_is_lifo() {
    let mut vm = VirtualMachine::new(MEM_SIZE);
    let program = vec![
        imm(Opcode::MOV, 0, 100),
        imm(Opcode::MOV, 1, 200),
        imm(Opcode::MOV, 2, 300),
        reg(Opcode::PUSH, 0, 0),
        reg(Opcode::PUSH, 1, 0),
        reg(Opcode::PUSH, 2, 0),
        imm(Opcode::MOV, 0, 0),
        imm(Opcode::MOV, 1, 0),
        imm(Opcode::MOV, 2, 0),
        reg(Opcode::POP, 5, 0),
        reg(Opcode::POP, 4, 0),
        reg(Opcode::POP, 3, 0),
        hlt(),
    ];
    vm.load_program(&program, 0).unwrap();
    vm.run().unwrap();
    assert_eq!(vm.get_register(3), 100);
    assert_eq!(vm.get_register(4), 200);
    assert_eq!(vm.get_register(5), 300);
}

#[test]
fn s5_memory_round_trip() {
    let mut vm = VirtualMachine::new(MEM_SIZE);
    let program = vec![
        imm(Opcode::MOV, 1, 0x3039),
        Instruction::new(Opcode::STORE, AddressingMode::Immediate, 0, 1, 0x10_0000).encode(),
        imm(Opcode::MOV, 1, 0),
        imm(Opcode::LOAD, 2, 0x10_0000),
        hlt(),
    ];
    vm.load_program(&program, 0).unwrap();
    vm.run().unwrap();
    assert_eq!(vm.get_register(2), 0x3039);
    assert_eq!(vm.memory().read64(0x10_0000).unwrap(), 0x3039);
}

#[test]
fn s6_firmware_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("s1.fw");
    let words = s1_program();
    FirmwareCodec::save(&path, &words, "demo", 0).unwrap();

    let firmware = FirmwareCodec::load(&path).unwrap();
    assert_eq!(firmware.instructions, words);

    let mut vm = VirtualMachine::new(MEM_SIZE);
    vm.load_firmware(&path).unwrap();
    vm.run().unwrap();
    assert_eq!(vm.get_register(2), 52);
}

#[test]
fn loaded_words_land_in_memory_and_pc_points_at_base() {
    let mut vm = VirtualMachine::new(MEM_SIZE);
    let words = s1_program();
    vm.load_program(&words, 0x80).unwrap();
    for (i, word) in words.iter().enumerate() {
        assert_eq!(vm.memory().read64(0x80 + i as u64 * 8).unwrap(), *word);
    }
    assert_eq!(vm.cpu().pc, 0x80);
    assert_eq!(vm.status(), CpuStatus::Loaded);
}

#[test]
fn oversized_and_empty_loads_are_rejected() {
    let mut vm = VirtualMachine::new(MEM_SIZE);
    assert!(matches!(vm.load_program(&[], 0), Err(VmError::EmptyProgram)));

    let end_of_memory = MEM_SIZE as u64 - 8;
    let err = vm.load_program(&[hlt(), hlt()], end_of_memory).unwrap_err();
    assert!(matches!(err, VmError::LoadTooLarge { .. }));
    // Nothing was written and the PC did not move.
    assert_eq!(vm.cpu().pc, 0);
    assert_eq!(vm.status(), CpuStatus::Fresh);
}

#[test]
fn call_then_ret_restores_pc_and_sp() {
    let mut vm = VirtualMachine::new(MEM_SIZE);
    // 0x00 CALL 0x20 / 0x08 MOV R1,#1 / 0x10 HLT / 0x18 pad / 0x20 RET
    let program = vec![
        imm(Opcode::CALL, 0, 0x20),
        imm(Opcode::MOV, 1, 1),
        hlt(),
        nop(),
        reg(Opcode::RET, 0, 0),
    ];
    vm.load_program(&program, 0).unwrap();
    let initial_sp = vm.cpu().sp;
    vm.run().unwrap();
    assert_eq!(vm.get_register(1), 1);
    assert_eq!(vm.cpu().sp, initial_sp);
}

#[test]
fn breakpoints_stop_and_resume() {
    let mut vm = VirtualMachine::new(MEM_SIZE);
    let program = vec![
        imm(Opcode::MOV, 0, 1), // 0x00
        imm(Opcode::MOV, 1, 2), // 0x08
        imm(Opcode::MOV, 2, 3), // 0x10
        hlt(),                  // 0x18
    ];
    vm.load_program(&program, 0).unwrap();
    vm.add_breakpoint(0x10);

    vm.run().unwrap();
    assert_eq!(vm.status(), CpuStatus::Halted);
    assert_eq!(vm.cpu().pc, 0x10);
    assert_eq!(vm.get_register(1), 2);
    assert_eq!(vm.get_register(2), 0);

    // Resuming steps over the breakpoint address and finishes.
    vm.run().unwrap();
    assert_eq!(vm.get_register(2), 3);
}

#[test]
fn step_executes_one_instruction_at_a_time() {
    let mut vm = VirtualMachine::new(MEM_SIZE);
    vm.load_program(&s1_program(), 0).unwrap();
    vm.step().unwrap();
    assert_eq!(vm.get_register(0), 42);
    assert_eq!(vm.get_register(1), 0);
    vm.step().unwrap();
    assert_eq!(vm.get_register(1), 10);
    assert!(vm.is_running());
    vm.stop();
    assert_eq!(vm.status(), CpuStatus::Halted);
}

#[test]
fn reset_clears_memory_but_keeps_segments() {
    let mut vm = VirtualMachine::new(MEM_SIZE);
    vm.load_program(&s1_program(), 0).unwrap();
    vm.run().unwrap();
    let segments = vm.memory().segments().len();

    vm.reset();
    assert_eq!(vm.status(), CpuStatus::Fresh);
    assert_eq!(vm.get_register(2), 0);
    assert_eq!(vm.cpu().pc, 0);
    assert_eq!(vm.memory().read64(0).unwrap(), 0);
    assert_eq!(vm.memory().segments().len(), segments);
}

#[test]
fn print_goes_through_the_redirected_bus() {
    let bus = SharedBus::default();
    let mut vm = VirtualMachine::with_bus(
        VmConfig {
            memory_size: MEM_SIZE,
            ..VmConfig::default()
        },
        Box::new(bus.clone()),
    );
    let program = vec![
        imm(Opcode::MOV, 0, 7),
        reg(Opcode::PRINT, 0, 0),
        imm(Opcode::OUT, 0, 1),
        hlt(),
    ];
    vm.load_program(&program, 0).unwrap();
    vm.run().unwrap();
    let log = bus.0.borrow();
    assert_eq!(log.printed, vec![7]);
    assert_eq!(log.written, vec![(1, 7)]);
}

#[test]
fn debug_toggle_does_not_change_results() {
    let mut plain = VirtualMachine::new(MEM_SIZE);
    plain.load_program(&s1_program(), 0).unwrap();
    plain.run().unwrap();

    let mut traced = VirtualMachine::with_config(VmConfig {
        memory_size: MEM_SIZE,
        debug: true,
        ..VmConfig::default()
    });
    traced.load_program(&s1_program(), 0).unwrap();
    traced.run().unwrap();

    for index in 0..16 {
        assert_eq!(plain.get_register(index), traced.get_register(index));
    }
    assert_eq!(plain.cpu().pc, traced.cpu().pc);
}

#[test]
fn diagnostics_never_fail() {
    let mut vm = VirtualMachine::new(MEM_SIZE);
    vm.load_program(&s1_program(), 0).unwrap();
    vm.print_state();
    vm.dump_registers();
    vm.dump_memory(0, 64);
    // Out-of-range spans just truncate.
    vm.dump_memory(MEM_SIZE as u64 + 64, 64);
}

#[test]
fn config_round_trips_through_json() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("vm.json");
    let config = VmConfig {
        memory_size: MEM_SIZE,
        load_base: 0x40,
        debug: true,
        step_by_step: false,
    };
    std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();
    assert_eq!(VmConfig::from_json_file(&path).unwrap(), config);
}
