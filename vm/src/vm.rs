use crate::{config::VmConfig, error::VmError};
use edvm_core::{
    error::VmCoreError,
    interpreter::Interpreter,
    io::{ConsoleBus, PortBus},
    state::{
        cpu_state::{CpuState, CpuStatus},
        flags::Flag,
        memory::Memory,
    },
};
use edvm_firmware::FirmwareCodec;
use edvm_types::{
    constants::{INSTRUCTION_SIZE, REGISTER_COUNT},
    types::{MemAddress, RegValue, Word},
};
use std::{
    collections::BTreeSet,
    io::{self, BufRead},
    path::Path,
};

/// The virtual machine facade.
///
/// Owns the RAM, the CPU state and the port bus, and guarantees the CPU
/// never outlives the memory it executes against. External collaborators
/// drive the engine exclusively through this type.
pub struct VirtualMachine {
    memory: Memory,
    cpu: CpuState,
    bus: Box<dyn PortBus>,
    breakpoints: BTreeSet<MemAddress>,
    config: VmConfig,
}

impl VirtualMachine {
    pub fn new(memory_size: usize) -> Self {
        Self::with_config(VmConfig {
            memory_size,
            ..VmConfig::default()
        })
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self::with_bus(config, Box::new(ConsoleBus))
    }

    /// Construction variant for harnesses that redirect the port bus.
    pub fn with_bus(config: VmConfig, bus: Box<dyn PortBus>) -> Self {
        let mut cpu = CpuState::new(config.memory_size);
        cpu.debug = config.debug;
        cpu.step_by_step = config.step_by_step;
        tracing::info!("virtual machine initialized with {} bytes of RAM", config.memory_size);
        Self {
            memory: Memory::new(config.memory_size),
            cpu,
            bus,
            breakpoints: BTreeSet::new(),
            config,
        }
    }

    /// Writes `program` into memory word by word starting at `base` and
    /// points the PC at it.
    pub fn load_program(&mut self, program: &[Word], base: MemAddress) -> Result<(), VmError> {
        if program.is_empty() {
            return Err(VmError::EmptyProgram);
        }
        let required = program.len() as u64 * INSTRUCTION_SIZE;
        let memory_size = self.memory.size() as u64;
        if base.checked_add(required).map_or(true, |end| end > memory_size) {
            return Err(VmError::LoadTooLarge {
                base,
                required,
                memory_size,
            });
        }

        for (i, word) in program.iter().enumerate() {
            self.memory
                .write64(base + i as u64 * INSTRUCTION_SIZE, *word)
                .map_err(VmCoreError::from)?;
        }
        self.cpu.pc = base;
        self.cpu.mark_loaded();
        tracing::info!(
            "loaded {} instructions ({required} bytes) at {base:#x}",
            program.len()
        );
        Ok(())
    }

    /// Convenience load at the configured default base.
    pub fn load(&mut self, program: &[Word]) -> Result<(), VmError> {
        self.load_program(program, self.config.load_base)
    }

    /// Loads a firmware image from disk at its stored entry point.
    pub fn load_firmware(&mut self, path: &Path) -> Result<(), VmError> {
        let firmware = FirmwareCodec::load(path)?;
        self.load_program(&firmware.instructions, firmware.entry_point)
    }

    /// Runs until HLT, an execution fault, or a breakpoint.
    pub fn run(&mut self) -> Result<(), VmError> {
        self.cpu.start();
        let mut first = true;
        while self.cpu.is_running() {
            // Skip the check on the first iteration so a resume from a
            // breakpoint address makes progress.
            if !first && self.breakpoints.contains(&self.cpu.pc) {
                tracing::info!("breakpoint hit at {:#x}", self.cpu.pc);
                self.cpu.halt();
                break;
            }
            first = false;
            Interpreter::step(&mut self.cpu, &mut self.memory, self.bus.as_mut())?;
            if self.cpu.step_by_step && self.cpu.is_running() {
                self.pause_for_key();
            }
        }
        tracing::info!("program execution stopped at pc {:#x}", self.cpu.pc);
        Ok(())
    }

    /// Executes a single instruction, starting the CPU if necessary.
    pub fn step(&mut self) -> Result<(), VmError> {
        if !self.cpu.is_running() {
            self.cpu.start();
        }
        Interpreter::step(&mut self.cpu, &mut self.memory, self.bus.as_mut())?;
        Ok(())
    }

    /// External stop; the next `run` resumes from the current PC.
    pub fn stop(&mut self) {
        self.cpu.halt();
    }

    /// Clears memory bytes (the segment table is kept) and resets the CPU.
    pub fn reset(&mut self) {
        self.memory.clear();
        self.cpu.reset();
        tracing::info!("virtual machine reset");
    }

    pub fn add_breakpoint(&mut self, address: MemAddress) {
        self.breakpoints.insert(address);
    }

    pub fn remove_breakpoint(&mut self, address: MemAddress) {
        self.breakpoints.remove(&address);
    }

    pub fn status(&self) -> CpuStatus {
        self.cpu.status()
    }

    pub fn is_running(&self) -> bool {
        self.cpu.is_running()
    }

    pub fn get_register(&self, index: usize) -> RegValue {
        self.cpu.get_register(index)
    }

    pub fn set_register(&mut self, index: usize, value: RegValue) {
        self.cpu.set_register(index, value);
    }

    pub fn cpu(&self) -> &CpuState {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut CpuState {
        &mut self.cpu
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn enable_debug(&mut self, enable: bool) {
        self.cpu.debug = enable;
    }

    pub fn enable_step_by_step(&mut self, enable: bool) {
        self.cpu.step_by_step = enable;
    }

    /// Diagnostic state display; never fails.
    pub fn print_state(&self) {
        println!("=== CPU State ===");
        println!("Status: {:?}", self.cpu.status());
        println!("PC:     {:#018x}", self.cpu.pc);
        println!("SP:     {:#018x}", self.cpu.sp);
        println!(
            "Flags:  Z={} C={} N={} V={} I={}",
            self.cpu.get_flag(Flag::Zero) as u8,
            self.cpu.get_flag(Flag::Carry) as u8,
            self.cpu.get_flag(Flag::Negative) as u8,
            self.cpu.get_flag(Flag::Overflow) as u8,
            self.cpu.get_flag(Flag::Interrupt) as u8,
        );
        self.dump_registers();
    }

    /// Diagnostic register display; never fails.
    pub fn dump_registers(&self) {
        for index in 0..REGISTER_COUNT {
            println!("R{index:<2}: {:#018x}", self.cpu.get_register(index));
        }
    }

    /// Diagnostic memory display; truncates at the end of memory and never
    /// fails.
    pub fn dump_memory(&self, start: MemAddress, length: u64) {
        print!("{}", self.memory.dump(start, length));
    }

    fn pause_for_key(&self) {
        self.print_state();
        println!("-- press enter to continue --");
        let mut line = String::new();
        let _ = io::stdin().lock().read_line(&mut line);
    }
}
