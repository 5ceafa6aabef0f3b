use crate::{
    error::VmCoreError,
    instruction::{opcode::Opcode, set::InstructionSet, Instruction},
    io::PortBus,
    state::{cpu_state::CpuState, flags::Flag, memory::Memory},
};
use edvm_types::constants::INSTRUCTION_SIZE;

/// Outcome of a single fetch-decode-execute round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitReason {
    /// The instruction completed and the CPU keeps going.
    Continue,
    /// The CPU is stopped: HLT executed, or it was not running at all.
    Halt,
}

/// The fetch-execute engine.
///
/// Stateless by design: all mutable state lives in [`CpuState`] and
/// [`Memory`], which the facade owns for the lifetime of the machine.
pub struct Interpreter;

impl Interpreter {
    /// Executes one instruction. A CPU that is not running is a no-op.
    ///
    /// Any execution fault logs a diagnostic and halts the CPU before the
    /// error is surfaced, so a later step cannot observe partial state.
    pub fn step(
        cpu: &mut CpuState,
        memory: &mut Memory,
        bus: &mut dyn PortBus,
    ) -> Result<ExitReason, VmCoreError> {
        if !cpu.is_running() {
            return Ok(ExitReason::Halt);
        }
        let pc = cpu.pc;
        match Self::fetch_execute(cpu, memory, bus) {
            Ok(reason) => Ok(reason),
            Err(e) => {
                tracing::error!("execution fault at pc {pc:#x}: {e}");
                cpu.halt();
                Err(e)
            }
        }
    }

    /// Runs the CPU until HLT or a fault.
    pub fn run(
        cpu: &mut CpuState,
        memory: &mut Memory,
        bus: &mut dyn PortBus,
    ) -> Result<(), VmCoreError> {
        cpu.start();
        while cpu.is_running() {
            Self::step(cpu, memory, bus)?;
        }
        Ok(())
    }

    fn fetch_execute(
        cpu: &mut CpuState,
        memory: &mut Memory,
        bus: &mut dyn PortBus,
    ) -> Result<ExitReason, VmCoreError> {
        let pc = cpu.pc;
        // Fetch is an EXECUTE access; the PC moves past the word before the
        // instruction runs, so CALL pushes the return address as-is.
        let word = memory.fetch64(pc)?;
        cpu.pc = pc.wrapping_add(INSTRUCTION_SIZE);
        let ins = Instruction::decode(word)?;
        if cpu.debug {
            tracing::debug!(
                "pc={pc:#08x} {:?} mode={:?} r1={} r2={} imm={:#x}",
                ins.op,
                ins.mode,
                ins.reg1,
                ins.reg2,
                ins.immediate
            );
        } else {
            tracing::trace!("pc={pc:#08x} {:?}", ins.op);
        }
        Self::execute(cpu, memory, bus, &ins)
    }

    fn execute(
        cpu: &mut CpuState,
        memory: &mut Memory,
        bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        use Opcode::*;
        match ins.op {
            MOV => InstructionSet::mov(cpu, memory, bus, ins),
            LOAD => InstructionSet::load(cpu, memory, bus, ins),
            STORE => InstructionSet::store(cpu, memory, bus, ins),
            PUSH => InstructionSet::push(cpu, memory, bus, ins),
            POP => InstructionSet::pop(cpu, memory, bus, ins),
            HLT => InstructionSet::hlt(cpu, memory, bus, ins),
            ADD => InstructionSet::add(cpu, memory, bus, ins),
            SUB => InstructionSet::sub(cpu, memory, bus, ins),
            MUL => InstructionSet::mul(cpu, memory, bus, ins),
            DIV => InstructionSet::div(cpu, memory, bus, ins),
            MOD => InstructionSet::modulo(cpu, memory, bus, ins),
            INC => InstructionSet::inc(cpu, memory, bus, ins),
            DEC => InstructionSet::dec(cpu, memory, bus, ins),
            CMP => InstructionSet::cmp(cpu, memory, bus, ins),
            SWAP => InstructionSet::swap(cpu, memory, bus, ins),
            AND => InstructionSet::and(cpu, memory, bus, ins),
            OR => InstructionSet::or(cpu, memory, bus, ins),
            XOR => InstructionSet::xor(cpu, memory, bus, ins),
            NOT => InstructionSet::not(cpu, memory, bus, ins),
            SHL => InstructionSet::shl(cpu, memory, bus, ins),
            SHR => InstructionSet::shr(cpu, memory, bus, ins),
            JMP => InstructionSet::jmp(cpu, memory, bus, ins),
            JZ | JEQ => InstructionSet::jump_if_zero(cpu, memory, bus, ins),
            JNZ | JNE => InstructionSet::jump_if_not_zero(cpu, memory, bus, ins),
            JC => InstructionSet::jump_if_carry(cpu, memory, bus, ins),
            JNC => InstructionSet::jump_if_not_carry(cpu, memory, bus, ins),
            JL => InstructionSet::jump_if_less(cpu, memory, bus, ins),
            JLE => InstructionSet::jump_if_less_or_equal(cpu, memory, bus, ins),
            JG => InstructionSet::jump_if_greater(cpu, memory, bus, ins),
            JGE => InstructionSet::jump_if_greater_or_equal(cpu, memory, bus, ins),
            LOOP => InstructionSet::loop_back(cpu, memory, bus, ins),
            CALL => InstructionSet::call(cpu, memory, bus, ins),
            RET => InstructionSet::ret(cpu, memory, bus, ins),
            NOP => InstructionSet::nop(cpu, memory, bus, ins),
            PRINT => InstructionSet::print(cpu, memory, bus, ins),
            IN => InstructionSet::port_in(cpu, memory, bus, ins),
            OUT => InstructionSet::port_out(cpu, memory, bus, ins),
        }
    }

    /// Interrupt entry stub. Pushes PC then FLAGS, loads PC from the vector
    /// table at address `n * 8` and clears the INTERRUPT flag. The current
    /// ISA never triggers this path itself.
    pub fn handle_interrupt(
        cpu: &mut CpuState,
        memory: &mut Memory,
        n: u64,
    ) -> Result<(), VmCoreError> {
        cpu.push(memory, cpu.pc)?;
        cpu.push(memory, cpu.flags.bits() as u64)?;
        cpu.pc = memory.read64(n * 8)?;
        cpu.flags.set(Flag::Interrupt, false);
        Ok(())
    }
}
