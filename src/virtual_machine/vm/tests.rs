use super::*;
use crate::network::transport::TransportKind;
use crate::virtual_machine::encoder::encode;
use crate::virtual_machine::host::StreamHost;
use crate::virtual_machine::host::tests::TestHost;
use crate::virtual_machine::vm::memory::MEMORY_SIZE;
use std::io::{self, Cursor, Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

fn vm_from_bytes(bytes: &[u8], input: &[u8], config: VmConfig) -> Vm<TestHost> {
    Vm::with_config(Image::from_bytes(bytes), TestHost::with_input(input), config)
}

fn run_vm(source: &str) -> Vm<TestHost> {
    let mut vm = Vm::new(encode(source), TestHost::with_input(b""));
    let halt = vm.run().expect("vm run failed");
    assert_eq!(halt, Halt::End);
    vm
}

fn run_bytes(bytes: &[u8], input: &[u8], config: VmConfig) -> (Halt, Vm<TestHost>) {
    let mut vm = vm_from_bytes(bytes, input, config);
    let halt = vm.run().expect("vm run failed");
    (halt, vm)
}

fn output(vm: &Vm<TestHost>) -> &[u8] {
    vm.host().output()
}

/// Writes `cells` into memory starting at the tape pointer.
fn load_tape(vm: &mut Vm<TestHost>, cells: &[u8]) {
    for (i, &cell) in cells.iter().enumerate() {
        let addr = vm.mp.wrapping_add(i as u16);
        vm.memory.set(addr, cell);
    }
}

/// Binds a loopback listener on a port whose number splits into two cell
/// values, returning the listener and the six endpoint cells.
fn bind_local() -> (TcpListener, [u8; 6]) {
    for low in 100..=255u8 {
        if let Ok(listener) = TcpListener::bind(("127.0.0.1", 20_000 + u16::from(low))) {
            return (listener, [127, 0, 0, 1, 20, low]);
        }
    }
    panic!("no free port in 20100..=20255");
}

// ==================== Programs ====================

#[test]
fn wrt_then_end() {
    let vm = run_vm("1 19");
    assert_eq!(output(&vm), &[0, b'\n']);
    assert_eq!(vm.mp(), 3);
}

#[test]
fn inc_then_wrt() {
    let vm = run_vm("7 0 1 19");
    assert_eq!(output(&vm), &[1, b'\n']);

    let (halt, vm) = run_bytes(&[7, 64, 1, 10], b"", VmConfig::default());
    assert_eq!(halt, Halt::End);
    assert_eq!(output(&vm), b"A\n");
}

#[test]
fn decorated_tokens_encode_to_the_same_program() {
    let vm = run_vm("seven=7 zero:0 one-1 ten/1+9");
    assert_eq!(output(&vm), &[1, b'\n']);
}

#[test]
fn high_nibble_is_ignored() {
    // 0x1A decodes as END
    let (halt, vm) = run_bytes(&[0x1A], b"", VmConfig::default());
    assert_eq!(halt, Halt::End);
    assert_eq!(vm.ip(), 0);
    assert_eq!(output(&vm), b"\n");
}

#[test]
fn nop_advances_by_one() {
    let (_, vm) = run_bytes(&[0, 0, 0, 10], b"", VmConfig::default());
    assert_eq!(vm.ip(), 3);
    assert_eq!(vm.steps(), 4);
}

// ==================== Tape ====================

#[test]
fn fwd_and_bak_move_by_operand_plus_one() {
    let (_, vm) = run_bytes(&[5, 2, 10], b"", VmConfig::default());
    assert_eq!(vm.mp(), 4 + 3);

    let (_, vm) = run_bytes(&[6, 0, 10], b"", VmConfig::default());
    assert_eq!(vm.mp(), 4 - 1);
}

#[test]
fn operand_255_moves_by_zero() {
    let (_, vm) = run_bytes(&[5, 255, 7, 255, 10], b"", VmConfig::default());
    assert_eq!(vm.mp(), 6);
    assert_eq!(vm.memory()[6], 0);
}

#[test]
fn mp_wraps_below_zero() {
    let (_, vm) = run_bytes(&[6, 9, 10], b"", VmConfig::default());
    assert_eq!(vm.mp(), 4u16.wrapping_sub(10));
    assert_eq!(vm.mp(), 65530);
}

#[test]
fn dec_wraps_below_zero() {
    let (_, vm) = run_bytes(&[8, 0, 1, 10], b"", VmConfig::default());
    assert_eq!(output(&vm), &[255, b'\n']);
}

#[test]
fn inc_wraps_past_255() {
    let (_, vm) = run_bytes(&[7, 254, 7, 0, 1, 10], b"", VmConfig::default());
    assert_eq!(output(&vm), &[0, b'\n']);
}

#[test]
fn ip_and_operand_wrap_past_top() {
    // Address 65535 holds INC, whose operand is the NOP at address 0
    let mut bytes = vec![0u8; MEMORY_SIZE];
    bytes[MEMORY_SIZE - 1] = 7;
    let config = VmConfig::new().with_max_steps(MEMORY_SIZE as u64);
    let (halt, vm) = run_bytes(&bytes, b"", config);

    assert_eq!(halt, Halt::StepLimit);
    assert_eq!(vm.ip(), 1);
    assert_eq!(vm.mp(), 1);
    assert_eq!(vm.memory()[1], 1);
}

// ==================== Control flow ====================

#[test]
fn if_skips_to_matching_eif() {
    // IF IF IF EIF WRT EIF WRT EIF INC 0 WRT END
    let bytes = [3, 3, 3, 4, 1, 4, 1, 4, 7, 0, 1, 10];
    let (_, vm) = run_bytes(&bytes, b"", VmConfig::default());
    assert_eq!(output(&vm), &[1, b'\n']);
}

#[test]
fn if_falls_through_on_nonzero() {
    // INC 0, IF, WRT, DEC 0, EIF, END
    let (_, vm) = run_bytes(&[7, 0, 3, 1, 8, 0, 4, 10], b"", VmConfig::default());
    assert_eq!(output(&vm), &[1, b'\n']);
}

#[test]
fn eif_loops_until_zero() {
    // INC 2, IF, WRT, DEC 0, EIF, END
    let (_, vm) = run_bytes(&[7, 2, 3, 1, 8, 0, 4, 10], b"", VmConfig::default());
    assert_eq!(output(&vm), &[3, 2, 1, b'\n']);
}

#[test]
fn nested_brackets_depth_three_forward() {
    let mut vm = vm_from_bytes(&[3, 3, 3, 4, 4, 4, 10], b"", VmConfig::default());
    assert_eq!(vm.step().unwrap(), Step::Continue);
    assert_eq!(vm.ip(), 6);
}

#[test]
fn nested_brackets_depth_three_backward() {
    let mut vm = vm_from_bytes(&[3, 3, 3, 4, 4, 4, 10], b"", VmConfig::default());
    load_tape(&mut vm, &[1]);
    vm.ip = 5;
    assert_eq!(vm.step().unwrap(), Step::Continue);
    assert_eq!(vm.ip(), 1);
}

#[test]
fn bracket_scan_decodes_operand_cells() {
    // The INC operand 4 is taken as the EIF closing the IF at 0
    let mut vm = vm_from_bytes(&[3, 7, 4, 1, 4, 10], b"", VmConfig::default());
    vm.step().unwrap();
    assert_eq!(vm.ip(), 3);
    assert_eq!(vm.run().unwrap(), Halt::End);
    assert_eq!(output(&vm), &[0, b'\n']);
}

#[test]
fn unmatched_if_falls_through() {
    let mut vm = vm_from_bytes(&[3], b"", VmConfig::default());
    assert_eq!(vm.step().unwrap(), Step::Continue);
    assert_eq!(vm.ip(), 1);
}

#[test]
fn unmatched_eif_falls_through() {
    let mut vm = vm_from_bytes(&[4], b"", VmConfig::default());
    load_tape(&mut vm, &[1]);
    assert_eq!(vm.step().unwrap(), Step::Continue);
    assert_eq!(vm.ip(), 1);
}

#[test]
fn program_can_rewrite_its_own_code() {
    // BAK 1 points the tape at address 4, INC 9 turns its NOP into END
    let config = VmConfig::new().with_max_steps(100);
    let (halt, vm) = run_bytes(&[6, 1, 7, 9, 0], b"", config);
    assert_eq!(halt, Halt::End);
    assert_eq!(vm.steps(), 3);
    assert_eq!(vm.ip(), 4);
    assert_eq!(vm.memory()[4], 10);
}

#[test]
fn unknown_opcode_stalls() {
    let config = VmConfig::new().with_max_steps(3);
    let (halt, vm) = run_bytes(&[11], b"", config);
    assert_eq!(halt, Halt::StepLimit);
    assert_eq!(vm.ip(), 0);
    assert_eq!(output(&vm), UNKNOWN_OPCODE_MESSAGE.repeat(3).as_bytes());
    assert_eq!(vm.profile().unknown(), 3);
}

#[test]
fn step_limit_does_not_write_newline() {
    let config = VmConfig::new().with_max_steps(1);
    let (halt, vm) = run_bytes(&[1, 10], b"", config);
    assert_eq!(halt, Halt::StepLimit);
    assert_eq!(output(&vm), &[0u8]);
}

#[test]
fn profile_counts_executed_opcodes() {
    let (_, vm) = run_bytes(&[7, 2, 3, 1, 8, 0, 4, 10], b"", VmConfig::default());
    let profile = vm.profile();
    assert_eq!(profile.count(Opcode::Inc), 1);
    assert_eq!(profile.count(Opcode::Wrt), 3);
    assert_eq!(profile.count(Opcode::Eif), 3);
    assert_eq!(profile.count(Opcode::End), 1);
    assert_eq!(profile.total(), vm.steps());
}

// ==================== Standard input ====================

#[test]
fn rd_stores_input_byte() {
    let (_, vm) = run_bytes(&[2, 1, 2, 1, 10], b"hi", VmConfig::default());
    assert_eq!(output(&vm), b"hi\n");
}

#[test]
fn rd_at_end_of_input_stores_zero() {
    let (halt, vm) = run_bytes(&[7, 4, 2, 1, 10], b"", VmConfig::default());
    assert_eq!(halt, Halt::End);
    assert_eq!(output(&vm), &[0, b'\n']);
}

#[test]
fn rd_at_end_of_input_keeps_cell() {
    let config = VmConfig::new().with_eof_policy(EofPolicy::Keep);
    let (halt, vm) = run_bytes(&[7, 4, 2, 1, 10], b"", config);
    assert_eq!(halt, Halt::End);
    assert_eq!(output(&vm), &[5, b'\n']);
}

#[test]
fn rd_at_end_of_input_halts() {
    let config = VmConfig::new().with_eof_policy(EofPolicy::Halt);
    let (halt, vm) = run_bytes(&[7, 4, 2, 1, 10], b"", config);
    assert_eq!(halt, Halt::InputExhausted);
    assert!(output(&vm).is_empty());
    assert_eq!(vm.ip(), 2);
}

// ==================== Cancellation ====================

#[test]
fn raised_stop_flag_cancels_before_first_step() {
    let mut vm = vm_from_bytes(&[1, 10], b"", VmConfig::default());
    vm.stop_handle().store(true, Ordering::Relaxed);
    assert_eq!(vm.run().unwrap(), Halt::Cancelled);
    assert_eq!(vm.steps(), 0);
    assert!(output(&vm).is_empty());
}

#[test]
fn stop_flag_cancels_running_program() {
    // An empty address space is an endless run of NOPs
    let mut vm = vm_from_bytes(&[], b"", VmConfig::default());
    let stop = Arc::new(AtomicBool::new(false));
    vm.set_stop_handle(Arc::clone(&stop));

    let setter = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        stop.store(true, Ordering::Relaxed);
    });
    assert_eq!(vm.run().unwrap(), Halt::Cancelled);
    setter.join().unwrap();
    assert!(vm.steps() > 0);
}

// ==================== Connections ====================

#[test]
fn con_failure_reports_and_keeps_stdout() {
    // CON, WRT, END with an endpoint no transport can reach
    let mut vm = vm_from_bytes(&[9, 1, 10], b"", VmConfig::default());
    load_tape(&mut vm, &[0, 0, 0, 0, 255, 255]);
    assert_eq!(vm.run().unwrap(), Halt::End);

    let mut expected = CONNECT_FAILURE_MESSAGE.as_bytes().to_vec();
    expected.extend_from_slice(&[0, b'\n']);
    assert_eq!(output(&vm), expected.as_slice());
    assert!(!vm.is_connected());
}

#[test]
fn con_advances_past_itself() {
    let mut vm = vm_from_bytes(&[9], b"", VmConfig::new().with_transports(Vec::new()));
    vm.step().unwrap();
    assert_eq!(vm.ip(), 1);
    assert_eq!(output(&vm), CONNECT_FAILURE_MESSAGE.as_bytes());
}

#[test]
fn con_redirects_wrt_over_tcp() {
    let (listener, cells) = bind_local();
    let mut vm = vm_from_bytes(&[9, 1, 10], b"", VmConfig::default());
    load_tape(&mut vm, &cells);

    vm.step().unwrap();
    assert!(vm.is_connected());
    assert_eq!(vm.connection().map(|c| c.kind()), Some(TransportKind::Tcp));
    assert_eq!(vm.run().unwrap(), Halt::End);
    assert!(!vm.is_connected());
    assert_eq!(output(&vm), b"\n");

    let (mut peer, _) = listener.accept().unwrap();
    let mut received = Vec::new();
    peer.read_to_end(&mut received).unwrap();
    assert_eq!(received, vec![127]);
}

#[test]
fn con_reads_until_peer_closes() {
    let (listener, cells) = bind_local();
    let peer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        stream.write_all(b"A").unwrap();
        let mut echoed = [0u8; 1];
        stream.read_exact(&mut echoed).unwrap();
        echoed[0]
    });

    // CON, RD, WRT, RD, WRT, END
    let mut vm = vm_from_bytes(&[9, 2, 1, 2, 1, 10], b"", VmConfig::default());
    load_tape(&mut vm, &cells);
    assert_eq!(vm.run().unwrap(), Halt::End);

    assert_eq!(peer.join().unwrap(), b'A');
    assert_eq!(vm.memory()[vm.mp()], 0);
    assert_eq!(output(&vm), b"\n");
}

#[test]
fn later_con_keeps_earlier_connection_open() {
    let (first, first_cells) = bind_local();
    let (second, second_cells) = bind_local();

    // CON, FWD 5, CON, WRT, END
    let mut vm = vm_from_bytes(&[9, 5, 5, 9, 1, 10], b"", VmConfig::default());
    let mut tape = first_cells.to_vec();
    tape.extend_from_slice(&second_cells);
    load_tape(&mut vm, &tape);
    for _ in 0..3 {
        assert_eq!(vm.step().unwrap(), Step::Continue);
    }

    let (mut a, _) = first.accept().unwrap();
    a.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
    let mut buf = [0u8; 1];
    assert!(a.read(&mut buf).is_err(), "first link closed by second CON");

    assert_eq!(vm.run().unwrap(), Halt::End);
    let (mut b, _) = second.accept().unwrap();
    let mut received = Vec::new();
    b.read_to_end(&mut received).unwrap();
    assert_eq!(received, vec![127]);

    // Ending the program closes only the active link.
    assert!(a.read(&mut buf).is_err());
    drop(vm);
    a.set_read_timeout(None).unwrap();
    assert_eq!(a.read(&mut buf).unwrap(), 0);
}

/// Writer whose flush always fails.
struct FailingFlush(Vec<u8>);

impl Write for FailingFlush {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::other("closed"))
    }
}

#[test]
fn rd_reports_failed_flush_as_output_error() {
    let host = StreamHost::new(Cursor::new(b"x".to_vec()), FailingFlush(Vec::new()));
    // RD, WRT, END
    let mut vm = Vm::with_config(Image::from_bytes(&[2, 1, 10]), host, VmConfig::default());
    assert!(matches!(vm.run(), Err(VMError::HostOutput(_))));

    let (input, _) = vm.into_host().into_parts();
    assert_eq!(input.position(), 0);
}
