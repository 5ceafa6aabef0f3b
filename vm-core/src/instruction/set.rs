use crate::{
    error::VmCoreError,
    instruction::{AddressingMode, Instruction, OperandRole},
    interpreter::ExitReason,
    io::PortBus,
    state::{cpu_state::CpuState, flags::Flag, memory::Memory},
};
use edvm_types::types::{MemAddress, RegValue};

/// A collection of single-instruction execution functions.
///
/// Each function implements exactly one opcode against the CPU state and
/// memory, returning whether the fetch loop keeps going. Flag updates
/// happen after the result has been written.
pub struct InstructionSet;

impl InstructionSet {
    //
    // Helper functions
    //

    /// Resolves an operand value for the given role per the addressing mode.
    fn operand_value(
        cpu: &CpuState,
        memory: &Memory,
        ins: &Instruction,
        role: OperandRole,
    ) -> Result<RegValue, VmCoreError> {
        let value = match ins.mode {
            AddressingMode::Register => cpu.read_reg(ins.reg(role)),
            AddressingMode::Immediate => ins.immediate as RegValue,
            AddressingMode::Memory => memory.read64(ins.immediate as MemAddress)?,
            AddressingMode::RegisterIndirect => memory.read64(cpu.read_reg(ins.reg(role)))?,
        };
        Ok(value)
    }

    /// Writes a value through an operand. An IMMEDIATE destination falls
    /// through to writing reg1.
    fn store_operand(
        cpu: &mut CpuState,
        memory: &mut Memory,
        ins: &Instruction,
        role: OperandRole,
        value: RegValue,
    ) -> Result<(), VmCoreError> {
        match ins.mode {
            AddressingMode::Register => cpu.write_reg(ins.reg(role), value),
            AddressingMode::Immediate => cpu.write_reg(ins.reg1, value),
            AddressingMode::Memory => memory.write64(ins.immediate as MemAddress, value)?,
            AddressingMode::RegisterIndirect => {
                memory.write64(cpu.read_reg(ins.reg(role)), value)?
            }
        }
        Ok(())
    }

    /// Branch targets are computed via the second-operand rule, so an
    /// IMMEDIATE target is an absolute byte address. The target is only
    /// evaluated when the branch is taken.
    fn branch_if(
        cpu: &mut CpuState,
        memory: &Memory,
        ins: &Instruction,
        condition: bool,
    ) -> Result<ExitReason, VmCoreError> {
        if condition {
            cpu.pc = Self::operand_value(cpu, memory, ins, OperandRole::Second)?;
        }
        Ok(ExitReason::Continue)
    }

    /// Signed "less than" after a CMP: NEGATIVE differs from OVERFLOW.
    fn is_less(cpu: &CpuState) -> bool {
        cpu.flags.get(Flag::Negative) != cpu.flags.get(Flag::Overflow)
    }

    //
    // Data movement
    //

    pub fn mov(
        cpu: &mut CpuState,
        memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let value = Self::operand_value(cpu, memory, ins, OperandRole::Second)?;
        Self::store_operand(cpu, memory, ins, OperandRole::First, value)?;
        Ok(ExitReason::Continue)
    }

    /// Loads the 64-bit word at the address named by the second operand
    /// into reg1.
    pub fn load(
        cpu: &mut CpuState,
        memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let address = Self::operand_value(cpu, memory, ins, OperandRole::Second)?;
        let value = memory.read64(address)?;
        cpu.write_reg(ins.reg1, value);
        Ok(ExitReason::Continue)
    }

    /// Stores reg2 at the address named by the first operand.
    pub fn store(
        cpu: &mut CpuState,
        memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let address = Self::operand_value(cpu, memory, ins, OperandRole::First)?;
        memory.write64(address, cpu.read_reg(ins.reg2))?;
        Ok(ExitReason::Continue)
    }

    pub fn push(
        cpu: &mut CpuState,
        memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let value = Self::operand_value(cpu, memory, ins, OperandRole::First)?;
        cpu.push(memory, value)?;
        Ok(ExitReason::Continue)
    }

    pub fn pop(
        cpu: &mut CpuState,
        memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let value = cpu.pop(memory)?;
        cpu.write_reg(ins.reg1, value);
        Ok(ExitReason::Continue)
    }

    //
    // Arithmetic
    //

    pub fn add(
        cpu: &mut CpuState,
        memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let op1 = cpu.read_reg(ins.reg1);
        let op2 = Self::operand_value(cpu, memory, ins, OperandRole::Second)?;
        let (result, carry) = op1.overflowing_add(op2);
        cpu.write_reg(ins.reg1, result);
        cpu.flags.update(result, carry, false);
        Ok(ExitReason::Continue)
    }

    pub fn sub(
        cpu: &mut CpuState,
        memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let op1 = cpu.read_reg(ins.reg1);
        let op2 = Self::operand_value(cpu, memory, ins, OperandRole::Second)?;
        let (result, borrow) = op1.overflowing_sub(op2);
        cpu.write_reg(ins.reg1, result);
        cpu.flags.update(result, borrow, false);
        Ok(ExitReason::Continue)
    }

    /// Low 64-bit half of the product; OVERFLOW records a lost high half.
    pub fn mul(
        cpu: &mut CpuState,
        memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let op1 = cpu.read_reg(ins.reg1);
        let op2 = Self::operand_value(cpu, memory, ins, OperandRole::Second)?;
        let result = op1.wrapping_mul(op2);
        let overflow = op2 != 0 && result / op2 != op1;
        cpu.write_reg(ins.reg1, result);
        cpu.flags.update(result, false, overflow);
        Ok(ExitReason::Continue)
    }

    pub fn div(
        cpu: &mut CpuState,
        memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let op1 = cpu.read_reg(ins.reg1);
        let op2 = Self::operand_value(cpu, memory, ins, OperandRole::Second)?;
        if op2 == 0 {
            return Err(VmCoreError::DivisionByZero);
        }
        let result = op1 / op2;
        cpu.write_reg(ins.reg1, result);
        cpu.flags.update(result, false, false);
        Ok(ExitReason::Continue)
    }

    pub fn modulo(
        cpu: &mut CpuState,
        memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let op1 = cpu.read_reg(ins.reg1);
        let op2 = Self::operand_value(cpu, memory, ins, OperandRole::Second)?;
        if op2 == 0 {
            return Err(VmCoreError::DivisionByZero);
        }
        let result = op1 % op2;
        cpu.write_reg(ins.reg1, result);
        cpu.flags.update(result, false, false);
        Ok(ExitReason::Continue)
    }

    pub fn inc(
        cpu: &mut CpuState,
        _memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let (result, carry) = cpu.read_reg(ins.reg1).overflowing_add(1);
        cpu.write_reg(ins.reg1, result);
        cpu.flags.update(result, carry, false);
        Ok(ExitReason::Continue)
    }

    pub fn dec(
        cpu: &mut CpuState,
        _memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let (result, borrow) = cpu.read_reg(ins.reg1).overflowing_sub(1);
        cpu.write_reg(ins.reg1, result);
        cpu.flags.update(result, borrow, false);
        Ok(ExitReason::Continue)
    }

    /// SUB without the register write-back.
    pub fn cmp(
        cpu: &mut CpuState,
        memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let op1 = cpu.read_reg(ins.reg1);
        let op2 = Self::operand_value(cpu, memory, ins, OperandRole::Second)?;
        let (result, borrow) = op1.overflowing_sub(op2);
        cpu.flags.update(result, borrow, false);
        Ok(ExitReason::Continue)
    }

    pub fn swap(
        cpu: &mut CpuState,
        _memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let a = cpu.read_reg(ins.reg1);
        let b = cpu.read_reg(ins.reg2);
        cpu.write_reg(ins.reg1, b);
        cpu.write_reg(ins.reg2, a);
        cpu.flags.update(b, false, false);
        Ok(ExitReason::Continue)
    }

    //
    // Logical
    //

    pub fn and(
        cpu: &mut CpuState,
        memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let op2 = Self::operand_value(cpu, memory, ins, OperandRole::Second)?;
        let result = cpu.read_reg(ins.reg1) & op2;
        cpu.write_reg(ins.reg1, result);
        cpu.flags.update(result, false, false);
        Ok(ExitReason::Continue)
    }

    pub fn or(
        cpu: &mut CpuState,
        memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let op2 = Self::operand_value(cpu, memory, ins, OperandRole::Second)?;
        let result = cpu.read_reg(ins.reg1) | op2;
        cpu.write_reg(ins.reg1, result);
        cpu.flags.update(result, false, false);
        Ok(ExitReason::Continue)
    }

    pub fn xor(
        cpu: &mut CpuState,
        memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let op2 = Self::operand_value(cpu, memory, ins, OperandRole::Second)?;
        let result = cpu.read_reg(ins.reg1) ^ op2;
        cpu.write_reg(ins.reg1, result);
        cpu.flags.update(result, false, false);
        Ok(ExitReason::Continue)
    }

    pub fn not(
        cpu: &mut CpuState,
        _memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let result = !cpu.read_reg(ins.reg1);
        cpu.write_reg(ins.reg1, result);
        cpu.flags.update(result, false, false);
        Ok(ExitReason::Continue)
    }

    /// Shift count is masked to the low 6 bits; CARRY holds the last bit
    /// shifted out (zero when the count is zero).
    pub fn shl(
        cpu: &mut CpuState,
        memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let op1 = cpu.read_reg(ins.reg1);
        let count = (Self::operand_value(cpu, memory, ins, OperandRole::Second)? & 0x3F) as u32;
        let (result, carry) = if count == 0 {
            (op1, false)
        } else {
            (op1 << count, op1 >> (64 - count) & 1 != 0)
        };
        cpu.write_reg(ins.reg1, result);
        cpu.flags.update(result, carry, false);
        Ok(ExitReason::Continue)
    }

    pub fn shr(
        cpu: &mut CpuState,
        memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let op1 = cpu.read_reg(ins.reg1);
        let count = (Self::operand_value(cpu, memory, ins, OperandRole::Second)? & 0x3F) as u32;
        let (result, carry) = if count == 0 {
            (op1, false)
        } else {
            (op1 >> count, op1 >> (count - 1) & 1 != 0)
        };
        cpu.write_reg(ins.reg1, result);
        cpu.flags.update(result, carry, false);
        Ok(ExitReason::Continue)
    }

    //
    // Control flow
    //

    pub fn jmp(
        cpu: &mut CpuState,
        memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        Self::branch_if(cpu, memory, ins, true)
    }

    /// JZ / JEQ
    pub fn jump_if_zero(
        cpu: &mut CpuState,
        memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let taken = cpu.flags.get(Flag::Zero);
        Self::branch_if(cpu, memory, ins, taken)
    }

    /// JNZ / JNE
    pub fn jump_if_not_zero(
        cpu: &mut CpuState,
        memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let taken = !cpu.flags.get(Flag::Zero);
        Self::branch_if(cpu, memory, ins, taken)
    }

    pub fn jump_if_carry(
        cpu: &mut CpuState,
        memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let taken = cpu.flags.get(Flag::Carry);
        Self::branch_if(cpu, memory, ins, taken)
    }

    pub fn jump_if_not_carry(
        cpu: &mut CpuState,
        memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let taken = !cpu.flags.get(Flag::Carry);
        Self::branch_if(cpu, memory, ins, taken)
    }

    pub fn jump_if_less(
        cpu: &mut CpuState,
        memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let taken = Self::is_less(cpu);
        Self::branch_if(cpu, memory, ins, taken)
    }

    pub fn jump_if_less_or_equal(
        cpu: &mut CpuState,
        memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let taken = cpu.flags.get(Flag::Zero) || Self::is_less(cpu);
        Self::branch_if(cpu, memory, ins, taken)
    }

    pub fn jump_if_greater(
        cpu: &mut CpuState,
        memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let taken = !cpu.flags.get(Flag::Zero) && !Self::is_less(cpu);
        Self::branch_if(cpu, memory, ins, taken)
    }

    pub fn jump_if_greater_or_equal(
        cpu: &mut CpuState,
        memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let taken = !Self::is_less(cpu);
        Self::branch_if(cpu, memory, ins, taken)
    }

    /// Decrements reg1 and branches while it is non-zero. Flags are left
    /// alone.
    pub fn loop_back(
        cpu: &mut CpuState,
        memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let counter = cpu.read_reg(ins.reg1).wrapping_sub(1);
        cpu.write_reg(ins.reg1, counter);
        Self::branch_if(cpu, memory, ins, counter != 0)
    }

    /// Pushes the post-fetch PC (the instruction after the CALL), then
    /// jumps.
    pub fn call(
        cpu: &mut CpuState,
        memory: &mut Memory,
        _bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let target = Self::operand_value(cpu, memory, ins, OperandRole::Second)?;
        cpu.push(memory, cpu.pc)?;
        cpu.pc = target;
        Ok(ExitReason::Continue)
    }

    /// Pops PC. No registers are restored; the calling convention is
    /// caller-saved.
    pub fn ret(
        cpu: &mut CpuState,
        memory: &mut Memory,
        _bus: &mut dyn PortBus,
        _ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        cpu.pc = cpu.pop(memory)?;
        Ok(ExitReason::Continue)
    }

    pub fn nop(
        _cpu: &mut CpuState,
        _memory: &mut Memory,
        _bus: &mut dyn PortBus,
        _ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        Ok(ExitReason::Continue)
    }

    //
    // System
    //

    pub fn hlt(
        cpu: &mut CpuState,
        _memory: &mut Memory,
        _bus: &mut dyn PortBus,
        _ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        cpu.halt();
        Ok(ExitReason::Halt)
    }

    /// Emits the first operand on the diagnostic channel.
    pub fn print(
        cpu: &mut CpuState,
        memory: &mut Memory,
        bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let value = Self::operand_value(cpu, memory, ins, OperandRole::First)?;
        bus.print(value);
        Ok(ExitReason::Continue)
    }

    pub fn port_in(
        cpu: &mut CpuState,
        memory: &mut Memory,
        bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let port = Self::operand_value(cpu, memory, ins, OperandRole::Second)? as u16;
        let value = bus.read(port);
        cpu.write_reg(ins.reg1, value);
        Ok(ExitReason::Continue)
    }

    pub fn port_out(
        cpu: &mut CpuState,
        memory: &mut Memory,
        bus: &mut dyn PortBus,
        ins: &Instruction,
    ) -> Result<ExitReason, VmCoreError> {
        let port = Self::operand_value(cpu, memory, ins, OperandRole::Second)? as u16;
        bus.write(port, cpu.read_reg(ins.reg1));
        Ok(ExitReason::Continue)
    }
}
